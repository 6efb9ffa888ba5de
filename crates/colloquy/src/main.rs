use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use colloquy_engine::{Reply, SendOptions, Session, SessionConfig, Theme};
use colloquy_h::{CdpProbe, LaunchOptions};
use std::time::Duration;
use tracing::info;

#[derive(Parser)]
#[command(name = "colloquy", version, about = "Drive the DeepSeek web chat from the command line")]
struct Args {
    /// Authentication token (preferred over email/password)
    #[arg(long, env = "COLLOQUY_TOKEN")]
    token: Option<String>,

    #[arg(long, env = "COLLOQUY_EMAIL")]
    email: Option<String>,

    #[arg(long, env = "COLLOQUY_PASSWORD")]
    password: Option<String>,

    /// Open a specific chat instead of the chat root
    #[arg(long)]
    chat: Option<String>,

    /// Launch the browser with a visible window
    #[arg(long)]
    headed: bool,

    /// Extra Chrome command-line arguments
    #[arg(long = "chrome-arg")]
    chrome_args: Vec<String>,

    /// Skip the bot-challenge verification pass
    #[arg(long)]
    no_verification: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Send a message and print the reply
    Send {
        message: String,
        /// Enable deep reasoning mode (+20s on the reply timeout)
        #[arg(long)]
        deepthink: bool,
        /// Enable search mode (+60s on the reply timeout)
        #[arg(long)]
        search: bool,
        /// Base reply timeout in seconds
        #[arg(long, default_value_t = 60)]
        timeout: u64,
        /// Type character by character instead of one shot
        #[arg(long)]
        slow: bool,
    },
    /// Regenerate the latest reply and print it
    Regenerate {
        #[arg(long, default_value_t = 60)]
        timeout: u64,
    },
    /// Print the stored authentication token
    Token,
    /// Start a fresh conversation
    Reset,
    /// Delete every conversation
    DeleteChats,
    /// Switch the persisted theme
    Theme {
        #[arg(value_enum)]
        theme: ThemeArg,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ThemeArg {
    Light,
    Dark,
    System,
}

impl From<ThemeArg> for Theme {
    fn from(arg: ThemeArg) -> Self {
        match arg {
            ThemeArg::Light => Theme::Light,
            ThemeArg::Dark => Theme::Dark,
            ThemeArg::System => Theme::System,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Log to stderr so stdout carries nothing but reply text.
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config = SessionConfig {
        token: args.token.clone(),
        email: args.email.clone(),
        password: args.password.clone(),
        chat_id: args.chat.clone(),
        attempt_verification: !args.no_verification,
        ..SessionConfig::default()
    };

    let launch = LaunchOptions {
        headless: !args.headed,
        chrome_args: args.chrome_args.clone(),
    };
    let probe = CdpProbe::launch(&launch)
        .await
        .context("failed to launch the browser")?;

    let mut session = Session::new(probe, config)?;
    session.initialize().await.context("initialization failed")?;

    let outcome = run(&mut session, &args.command).await;
    session.terminate();
    info!("session terminated");
    outcome
}

async fn run(session: &mut Session<CdpProbe>, command: &Command) -> anyhow::Result<()> {
    match command {
        Command::Send {
            message,
            deepthink,
            search,
            timeout,
            slow,
        } => {
            let options = SendOptions {
                deepthink: *deepthink,
                search: *search,
                slow_mode: *slow,
                timeout: Duration::from_secs(*timeout),
                ..SendOptions::default()
            };
            match session.send_message(message, options).await? {
                Some(reply) => print_reply(&reply),
                None => eprintln!("no reply observed before the deadline"),
            }
        }
        Command::Regenerate { timeout } => {
            match session.regenerate(Duration::from_secs(*timeout)).await? {
                Some(reply) => print_reply(&reply),
                None => eprintln!("no reply observed before the deadline"),
            }
        }
        Command::Token => match session.retrieve_token().await? {
            Some(token) => println!("{token}"),
            None => eprintln!("no token in storage"),
        },
        Command::Reset => session.reset_chat().await?,
        Command::DeleteChats => session.delete_all_chats().await?,
        Command::Theme { theme } => session.switch_theme((*theme).into()).await?,
    }
    Ok(())
}

fn print_reply(reply: &Reply) {
    if let Some(duration) = reply.deepthink_duration {
        eprintln!("[thought for {duration}s]");
    }
    if let Some(content) = &reply.deepthink_content {
        eprintln!("--- reasoning ---");
        eprintln!("{content}");
        eprintln!("-----------------");
    }
    if let Some(results) = &reply.search_results {
        for result in results {
            eprintln!(
                "[{}] {} ({}, {})",
                result.index, result.title, result.website, result.date
            );
        }
    }
    println!("{}", reply.text);
}
