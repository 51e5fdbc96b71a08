use anyhow::Result;

use alfred::models::message::Message;

pub mod rustyline;
pub mod thinking;

pub trait Prompt {
    fn render(&mut self, message: &Message);
    fn get_input(&mut self) -> Result<Input>;
    fn show_busy(&mut self);
    fn hide_busy(&self);
    fn close(&self);
    fn alfred_ready(&self) {
        println!("\n");
        println!("Alfred is at your service. Ask about the guests, the news, or the Hub.");
        println!("Type /help for commands.");
        println!("\n");
    }
}

pub struct Input {
    pub input_type: InputType,
    pub content: Option<String>, // Message text, or the comment attached to a rating
}

#[derive(Debug, PartialEq)]
pub enum InputType {
    AskAgain, // Ask the user for input again. Control flow command.
    Message,  // User sent a message
    Rate(u8), // Rate the last answer from 1 to 5
    Exit,     // User wants to exit the session
}

pub enum Theme {
    Light,
    Dark,
}

/// What a line typed at the prompt asks for
#[derive(Debug, PartialEq)]
pub enum Command {
    Empty,
    Exit,
    Help,
    ToggleTheme,
    Rate {
        score: u8,
        comment: Option<String>,
    },
    InvalidRating(String),
    Message(String),
}

pub const HELP_TEXT: &str = "Commands:
/exit | /quit - Exit the session
/rate <1-5> [comment] - Rate Alfred's last answer
/t - Toggle Light/Dark theme
/? | /help - Display this help message
Ctrl+C - Interrupt Alfred (resets the interaction to before the interrupted request)";

pub fn parse_command(line: &str) -> Command {
    let line = line.trim();
    if line.is_empty() {
        return Command::Empty;
    }

    let mut parts = line.splitn(2, char::is_whitespace);
    let head = parts.next().unwrap_or_default();
    let rest = parts.next().map(str::trim).unwrap_or_default();

    if head.eq_ignore_ascii_case("/exit") || head.eq_ignore_ascii_case("/quit") {
        Command::Exit
    } else if head.eq_ignore_ascii_case("/?") || head.eq_ignore_ascii_case("/help") {
        Command::Help
    } else if head.eq_ignore_ascii_case("/t") {
        Command::ToggleTheme
    } else if head.eq_ignore_ascii_case("/rate") {
        parse_rating(rest)
    } else {
        Command::Message(line.to_string())
    }
}

fn parse_rating(args: &str) -> Command {
    let mut parts = args.splitn(2, char::is_whitespace);
    let score = parts.next().unwrap_or_default();
    match score.parse::<u8>() {
        Ok(score) if (1..=5).contains(&score) => Command::Rate {
            score,
            comment: parts
                .next()
                .map(str::trim)
                .filter(|comment| !comment.is_empty())
                .map(str::to_string),
        },
        _ => Command::InvalidRating(format!(
            "Ratings go from 1 to 5, for example: /rate 5 splendid. Got '{}'",
            score
        )),
    }
}
