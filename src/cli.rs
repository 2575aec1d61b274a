// src/cli.rs

use crate::api::{ChatStream, RemoteInference};
use crate::book::{BookChat, BookClient};
use crate::config::{get_config, update_config, Config};
use crate::constants::SUPPORTED_REMOTE_MODELS;
use crate::errors::{InferenceError, InferenceResult};
use crate::graph::{display_id, BookGraph};
use crate::media::{encode_image_to_data_url, ImageResolver, LocalFileResolver};
use crate::models::{Conversation, Message};
use crate::stream::StreamEvent;
use colored::Colorize;
use dialoguer::{theme::ColorfulTheme, Input, Select};
use indicatif::{ProgressBar, ProgressStyle};
use log::info;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Duration;

const MENU_ITEMS: &[&str] = &[
    "💬 Chat with remote model",
    "📚 Analyze a book",
    "⚙️ Settings",
    "🚪 Quit",
];

fn readline_error(e: ReadlineError) -> InferenceError {
    InferenceError::Io(io::Error::new(io::ErrorKind::Other, e))
}

/// Runs the main menu until the user quits.
pub async fn run() -> InferenceResult<()> {
    loop {
        let config = get_config();
        let selection = Select::with_theme(&ColorfulTheme::default())
            .with_prompt("What would you like to do?")
            .items(MENU_ITEMS)
            .default(0)
            .interact()?;

        match selection {
            0 => chat_session(&config).await?,
            1 => book_session(&config).await?,
            2 => settings(&config)?,
            _ => return Ok(()),
        }
    }
}

fn print_chat_help() {
    println!("{}", "Commands:".bold());
    println!("  /image <path>  attach an image to your next message");
    println!("  /clear         clear the chat history");
    println!("  /quit          back to the menu");
}

/// Checks an image up front so a bad file never enters the history.
fn attach_image(conversation: &mut Conversation, reference: &str) {
    let Some(path) = LocalFileResolver.resolve(reference) else {
        println!("{}", format!("No such image: {}", reference).red());
        return;
    };
    match encode_image_to_data_url(&path) {
        Ok(_) => {
            conversation.push(Message::user_image(reference));
            println!("{}", format!("Attached {}", path.display()).dimmed());
        }
        Err(e) => println!("{}", e.to_string().red()),
    }
}

/// Starts the reply to `input`. The user turn is recorded only once the
/// request has been built, so a failed send leaves the history untouched.
fn start_turn(
    remote: &RemoteInference,
    conversation: &mut Conversation,
    input: &str,
    config: &Config,
    resolver: &dyn ImageResolver,
) -> InferenceResult<ChatStream> {
    let turn = Message::user_text(input);
    let mut turns = conversation.messages().to_vec();
    turns.push(turn.clone());

    let stream = remote.chat(&turns, config, resolver)?;
    conversation.push(turn);
    Ok(stream)
}

async fn chat_session(config: &Config) -> InferenceResult<()> {
    let remote = RemoteInference::from_config(config);
    let mut conversation = Conversation::new();
    let mut editor = DefaultEditor::new().map_err(readline_error)?;

    println!(
        "{} {}",
        "Chatting with".green(),
        config.model.as_str().bold()
    );
    print_chat_help();

    loop {
        let line = match editor.readline("you › ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => return Err(readline_error(e)),
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        let _ = editor.add_history_entry(input);

        if input == "/quit" {
            break;
        } else if input == "/clear" {
            conversation.clear();
            println!("{}", "Chat history cleared.".dimmed());
            continue;
        } else if let Some(reference) = input.strip_prefix("/image") {
            attach_image(&mut conversation, reference.trim());
            continue;
        } else if input.starts_with('/') {
            print_chat_help();
            continue;
        }

        let mut stream =
            match start_turn(&remote, &mut conversation, input, config, &LocalFileResolver) {
                Ok(stream) => stream,
                Err(e) => {
                    println!("{}", e.to_string().red());
                    continue;
                }
            };

        let mut received = false;
        let mut rate = None;
        print!("{} ", "llama ›".cyan());
        while let Some(event) = stream.next().await {
            match event {
                StreamEvent::Fragment(fragment) => {
                    received = true;
                    print!("{}", fragment);
                    io::stdout().flush()?;
                    conversation.append_to_last_assistant(&fragment);
                }
                StreamEvent::TokenRate(tps) => rate = Some(tps),
                StreamEvent::Done => break,
            }
        }
        println!();

        if !received {
            println!("{}", "(no response, see the log for details)".yellow());
        }
        if let Some(tps) = rate {
            println!("{}", format!("{:.1} tokens/s", tps).dimmed());
        }
    }

    info!("Chat session ended after {} messages", conversation.len());
    Ok(())
}

fn print_book(book: &BookGraph, num_input_tokens: u64) {
    println!();
    println!("{}", book.title.as_str().bold().underline());
    if !book.summary.is_empty() {
        println!("{}", book.summary);
    }
    println!("{}", format!("Input tokens: {}", num_input_tokens).dimmed());

    println!("\n{}", "Characters".bold());
    for node in &book.graph.nodes {
        println!(
            "  {} {}",
            format!("[{}]", display_id(&node.id)).dimmed(),
            node.name
        );
    }

    println!("\n{}", "Relationships".bold());
    for link in &book.graph.links {
        let source = book
            .graph
            .node_name(&link.source)
            .map(str::to_string)
            .unwrap_or_else(|| display_id(&link.source));
        let target = book
            .graph
            .node_name(&link.target)
            .map(str::to_string)
            .unwrap_or_else(|| display_id(&link.target));
        println!(
            "  {} {} {}: {}",
            source.yellow(),
            "→".dimmed(),
            target.yellow(),
            link.label
        );
    }
    println!();
}

async fn book_session(config: &Config) -> InferenceResult<()> {
    let path: String = Input::with_theme(&ColorfulTheme::default())
        .with_prompt("Path to the book (plain text)")
        .interact_text()?;
    let path = PathBuf::from(path.trim());
    if !path.is_file() {
        println!("{}", format!("Not a file: {}", path.display()).red());
        return Ok(());
    }

    let client =
        BookClient::new(&config.inference_server_url).with_api_log(config.api_log_path.clone());

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.cyan} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(format!("Analyzing {}...", path.display()));
    pb.enable_steady_tick(Duration::from_millis(100));

    let analysis = client.analyze_book(&path).await;
    pb.finish_and_clear();

    let analysis = match analysis {
        Ok(analysis) => analysis,
        Err(e) => {
            println!("{}", format!("Sorry, I couldn't analyze the book: {}", e).red());
            return Ok(());
        }
    };
    print_book(&analysis.book, analysis.num_input_tokens);

    let mut chat = BookChat::new(client, analysis.relationship_text);
    if let Some(greeting) = chat.history().first() {
        println!("{} {}", "book ›".cyan(), greeting.text);
    }

    let mut editor = DefaultEditor::new().map_err(readline_error)?;
    loop {
        let line = match editor.readline("you › ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => return Err(readline_error(e)),
        };
        if line.trim() == "/quit" {
            break;
        }
        let _ = editor.add_history_entry(line.as_str());

        if let Some(reply) = chat.send(&line).await {
            println!("{} {}", "book ›".cyan(), reply);
        }
    }

    Ok(())
}

fn settings(config: &Config) -> InferenceResult<()> {
    let masked_key = if config.api_key.is_empty() {
        "(not set)".red().to_string()
    } else {
        format!("{}…", &config.api_key.chars().take(4).collect::<String>())
    };

    println!("{}", "Current settings".bold());
    println!("  remote url:        {}", config.remote_url);
    println!("  api key:           {}", masked_key);
    println!("  model:             {}", config.model);
    println!("  temperature:       {}", config.temperature);
    println!("  system prompt:     {}", config.system_prompt);
    println!("  inference server:  {}", config.inference_server_url);

    let remote_url: String = Input::with_theme(&ColorfulTheme::default())
        .with_prompt("Remote URL")
        .default(config.remote_url.clone())
        .interact_text()?;

    let current = SUPPORTED_REMOTE_MODELS
        .iter()
        .position(|m| *m == config.model)
        .unwrap_or(0);
    let selection = Select::with_theme(&ColorfulTheme::default())
        .with_prompt("Remote model")
        .items(SUPPORTED_REMOTE_MODELS)
        .default(current)
        .interact()?;

    let temperature: f32 = Input::with_theme(&ColorfulTheme::default())
        .with_prompt("Temperature")
        .default(config.temperature)
        .interact_text()?;

    let system_prompt: String = Input::with_theme(&ColorfulTheme::default())
        .with_prompt("System prompt")
        .default(config.system_prompt.clone())
        .allow_empty(true)
        .interact_text()?;

    let inference_server_url: String = Input::with_theme(&ColorfulTheme::default())
        .with_prompt("Book inference server URL")
        .default(config.inference_server_url.clone())
        .interact_text()?;

    let mut updated = config.clone();
    updated.remote_url = remote_url.trim().to_string();
    updated.model = SUPPORTED_REMOTE_MODELS[selection].to_string();
    updated.temperature = temperature;
    updated.system_prompt = system_prompt;
    updated.inference_server_url = inference_server_url.trim().to_string();

    match update_config(updated) {
        Ok(()) => println!("{}", "Settings saved.".green()),
        Err(e) => println!("{}", e.to_string().red()),
    }

    Ok(())
}
