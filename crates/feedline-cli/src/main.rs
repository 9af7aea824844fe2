//! feedline: command-line client for the Feedline social feed
//!
//! Every invocation restores the session from the credential file first, so
//! `login` once and later commands act as that user until `logout`.

use clap::{Parser, Subcommand};
use feedline_client::{Comment, Post, PostId, SortMode, UserId};
use feedline_sdk::{FeedController, FeedScope, Feedline, SdkConfig, SessionState};
use tracing::{debug, info};

#[derive(Parser)]
#[command(name = "feedline")]
#[command(about = "Command-line client for the Feedline social feed")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "feedline.toml", env = "FEEDLINE_CONFIG")]
    config: String,

    /// Feed service URL (overrides config file and FEEDLINE_API_URL)
    #[arg(long)]
    api_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create an account
    Register {
        email: String,
        username: String,
        #[arg(long, env = "FEEDLINE_PASSWORD")]
        password: String,
    },
    /// Sign in and remember the session
    Login {
        email: String,
        #[arg(long, env = "FEEDLINE_PASSWORD")]
        password: String,
    },
    /// Forget the stored session
    Logout,
    /// Show the signed-in user
    Whoami,
    /// List all posts
    Feed {
        /// new, old or most_likes
        #[arg(long)]
        sort: Option<SortMode>,
    },
    /// Show one post and its comments
    Show { id: PostId },
    /// List posts by one user
    UserPosts { user_id: UserId },
    /// Publish a post
    Post {
        body: String,
        #[arg(long)]
        image: Option<String>,
    },
    /// Replace the body of one of your posts
    Edit { id: PostId, body: String },
    /// Delete one of your posts
    Delete { id: PostId },
    /// Like a post
    Like { id: PostId },
    /// List comments on a post
    Comments { post_id: PostId },
    /// Comment on a post
    Comment { post_id: PostId, body: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("feedline=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = SdkConfig::load(&cli.config)?;
    config.apply_env();
    if let Some(url) = cli.api_url {
        config.api.base_url = url;
    }
    debug!(base_url = %config.api.base_url, "Configuration loaded");

    let app = Feedline::from_config(&config)?;
    let state = app.session().rehydrate().await;
    if let SessionState::Authenticated(session) = &state {
        debug!(username = %session.username(), "Session restored");
    }

    run(&app, cli.command).await
}

async fn run(app: &Feedline, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Register {
            email,
            username,
            password,
        } => {
            let receipt = app.session().register(&email, &username, &password).await?;
            println!("Registered {} ({})", username, receipt.detail);
            println!("Run `feedline login {}` to sign in", email);
        }
        Command::Login { email, password } => {
            let user = app.session().login(&email, &password).await?;
            println!("Signed in as {} (#{})", user.username, user.id);
        }
        Command::Logout => {
            app.session().logout();
            println!("Signed out");
        }
        Command::Whoami => match app.session().current_user() {
            Some(user) => println!("{} <{}> (#{})", user.username, user.email, user.id),
            None => println!("Not signed in"),
        },
        Command::Feed { sort } => {
            let feed = app.feed(FeedScope::Global);
            match sort {
                Some(mode) => feed.set_sort_mode(mode).await?,
                None => feed.refresh().await?,
            };
            print_feed(&feed);
        }
        Command::Show { id } => {
            let feed = app.feed(FeedScope::Post(id));
            feed.refresh().await?;
            print_feed(&feed);

            let comments = app.comments(id);
            comments.refresh().await?;
            print_comments(&comments.view().items);
        }
        Command::UserPosts { user_id } => {
            let feed = app.feed(FeedScope::User(user_id));
            feed.refresh().await?;
            print_feed(&feed);
        }
        Command::Post { body, image } => {
            let feed = app.feed(FeedScope::Global);
            let post = feed.submit_new_post(&body, image.as_deref()).await?;
            info!(post_id = post.id, "Published");
            print_feed(&feed);
        }
        Command::Edit { id, body } => {
            let feed = app.feed(FeedScope::Post(id));
            feed.edit(id, &body).await?;
            print_feed(&feed);
        }
        Command::Delete { id } => {
            app.feed(FeedScope::Post(id)).remove(id).await?;
            println!("Deleted post #{}", id);
        }
        Command::Like { id } => {
            let feed = app.feed(FeedScope::Post(id));
            feed.like(id).await?;
            print_feed(&feed);
        }
        Command::Comments { post_id } => {
            let comments = app.comments(post_id);
            comments.refresh().await?;
            print_comments(&comments.view().items);
        }
        Command::Comment { post_id, body } => {
            let comments = app.comments(post_id);
            comments.submit(&body).await?;
            print_comments(&comments.view().items);
        }
    }

    Ok(())
}

fn print_feed(feed: &FeedController) {
    let view = feed.view();
    if view.items.is_empty() {
        println!("(no posts)");
    }
    for post in &view.items {
        print_post(post);
    }
}

fn print_post(post: &Post) {
    println!(
        "#{} {} · {} · {} like(s)",
        post.id,
        post.author_username,
        post.created_at.format("%Y-%m-%d %H:%M"),
        post.like_count
    );
    println!("    {}", post.body);
    if let Some(url) = &post.image_url {
        println!("    [image] {}", url);
    }
}

fn print_comments(comments: &[Comment]) {
    if comments.is_empty() {
        println!("(no comments)");
    }
    for comment in comments {
        println!(
            "  - {} ({}): {}",
            comment.author_username,
            comment.created_at.format("%Y-%m-%d %H:%M"),
            comment.body
        );
    }
}
