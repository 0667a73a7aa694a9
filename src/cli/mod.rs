mod serve;

use anyhow::Result;
use console::style;
use std::path::PathBuf;

use crate::core::config::ServerConfig;
use crate::core::terminal::{self, print_error};
use crate::interfaces::cli as client;
use serve::ServeArgs;

fn default_api_url() -> String {
    let server = ServerConfig::default();
    format!("http://{}:{}", server.host, server.port)
}

fn print_help() {
    terminal::print_banner();

    println!(" {}", style("Commands").bold());
    println!(
        "   {}     Run the feed daemon (HTTP API + job scheduler)",
        style("serve").green()
    );
    println!(
        "   {}      Send a prompt and stream the live activity feed",
        style("chat").green()
    );
    println!("   {}  List sessions", style("sessions").green());
    println!("   {}      Show this guide", style("help").green());
    println!();
    println!(" {}", style("Flags").bold());
    println!("   serve:    --host <H>  --port <P>  --data-dir <DIR>");
    println!("   chat:     --prompt <TEXT>  [--session <ID>]  [--api-url <URL>]");
    println!("   sessions: [--api-url <URL>]");
    println!(
        "\n {} {} <command> [flags]\n",
        style("Usage:").bold(),
        style("feedline").green()
    );
}

pub(crate) fn parse_serve_flags(args: &[String], start: usize) -> ServeArgs {
    let mut parsed = ServeArgs::default();
    let mut i = start;
    while i < args.len() {
        match args[i].as_str() {
            "--host" => {
                if i + 1 < args.len() {
                    parsed.host = Some(args[i + 1].clone());
                    i += 2;
                } else {
                    i += 1;
                }
            }
            "--port" => {
                if i + 1 < args.len() {
                    parsed.port = args[i + 1].parse().ok();
                    i += 2;
                } else {
                    i += 1;
                }
            }
            "--data-dir" => {
                if i + 1 < args.len() {
                    parsed.data_dir = Some(PathBuf::from(&args[i + 1]));
                    i += 2;
                } else {
                    i += 1;
                }
            }
            _ => i += 1,
        }
    }
    parsed
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ChatCommandArgs {
    pub prompt: String,
    pub session: Option<String>,
    pub api_url: String,
}

pub(crate) fn parse_chat_flags(args: &[String], start: usize, api_url: String) -> ChatCommandArgs {
    let mut parsed = ChatCommandArgs {
        prompt: String::new(),
        session: None,
        api_url,
    };
    let mut i = start;
    while i < args.len() {
        match args[i].as_str() {
            "--prompt" | "-p" => {
                if i + 1 < args.len() {
                    parsed.prompt = args[i + 1].clone();
                    i += 2;
                } else {
                    i += 1;
                }
            }
            "--session" | "-s" => {
                if i + 1 < args.len() {
                    parsed.session = Some(args[i + 1].clone());
                    i += 2;
                } else {
                    i += 1;
                }
            }
            "--api-url" => {
                if i + 1 < args.len() {
                    parsed.api_url = args[i + 1].clone();
                    i += 2;
                } else {
                    i += 1;
                }
            }
            _ => i += 1,
        }
    }
    parsed
}

pub(crate) fn parse_api_url_flag(args: &[String], start: usize, mut api_url: String) -> String {
    let mut i = start;
    while i < args.len() {
        match args[i].as_str() {
            "--api-url" => {
                if i + 1 < args.len() {
                    api_url = args[i + 1].clone();
                    i += 2;
                } else {
                    i += 1;
                }
            }
            _ => i += 1,
        }
    }
    api_url
}

pub async fn run_main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        print_help();
        return Ok(());
    }

    match args[1].as_str() {
        "serve" => serve::run_serve(parse_serve_flags(&args, 2)).await,
        "chat" => {
            let parsed = parse_chat_flags(&args, 2, default_api_url());
            if parsed.prompt.is_empty() {
                print_error("Error: --prompt is required for chat.");
                print_help();
                return Ok(());
            }
            client::run_chat(&parsed.api_url, &parsed.prompt, parsed.session.as_deref()).await
        }
        "sessions" => {
            let api_url = parse_api_url_flag(&args, 2, default_api_url());
            client::run_sessions(&api_url).await
        }
        "help" | "--help" | "-h" => {
            print_help();
            Ok(())
        }
        cmd => {
            print_error(&format!("Unknown command: {}", cmd));
            print_help();
            Ok(())
        }
    }
}
