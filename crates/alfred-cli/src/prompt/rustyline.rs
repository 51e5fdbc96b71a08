use std::io::{self, Write};

use anyhow::Result;
use bat::WrappingMode;
use cliclack::spinner;
use console::style;
use serde_json::Value;

use alfred::models::message::{Message, MessageContent, ToolRequest, ToolResponse};

use super::{
    parse_command, thinking::get_random_thinking_message, Command, Input, InputType, Prompt,
    Theme, HELP_TEXT,
};

const PROMPT: &str = "\x1b[1m\x1b[38;5;94m(🎩)> \x1b[0m";
const MAX_STRING_LENGTH: usize = 60;
const INDENT: &str = "    ";

pub struct RustylinePrompt {
    spinner: cliclack::ProgressBar,
    theme: Theme,
    editor: Option<rustyline::DefaultEditor>,
}

impl RustylinePrompt {
    pub fn new() -> Self {
        RustylinePrompt {
            spinner: spinner(),
            theme: Theme::Dark,
            editor: None,
        }
    }

    fn theme_name(&self) -> &'static str {
        match self.theme {
            Theme::Light => "GitHub",
            Theme::Dark => "zenburn",
        }
    }

    fn editor(&mut self) -> Result<&mut rustyline::DefaultEditor> {
        if self.editor.is_none() {
            self.editor = Some(rustyline::DefaultEditor::new()?);
        }
        self.editor
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("line editor unavailable"))
    }
}

fn render_tool_request(tool_request: &ToolRequest, theme: &str) {
    match &tool_request.tool_call {
        Ok(call) => {
            print_newline();
            println!(
                "─── {} ──────────────────────────",
                style(&call.name).magenta().dim()
            );
            print_params(&call.arguments, 0);
            print_newline();
        }
        Err(e) => print_markdown(&e.to_string(), theme),
    }
}

fn render_tool_response(tool_response: &ToolResponse, theme: &str) {
    match &tool_response.tool_result {
        Ok(output) => print_markdown(output, theme),
        Err(e) => println!("{}", style(e.to_string()).red()),
    }
}

fn print_markdown(content: &str, theme: &str) {
    let printed = bat::PrettyPrinter::new()
        .input(bat::Input::from_bytes(content.as_bytes()))
        .theme(theme)
        .language("Markdown")
        .wrapping_mode(WrappingMode::Character)
        .print();
    if printed.is_err() {
        println!("{}", content);
    }
}

/// Format and print parameters recursively with proper indentation and colors
fn print_params(value: &Value, depth: usize) {
    let indent = INDENT.repeat(depth);

    match value {
        Value::Object(map) => {
            for (key, val) in map {
                match val {
                    Value::Object(_) | Value::Array(_) => {
                        println!("{}{}:", indent, style(key).dim());
                        print_params(val, depth + 1);
                    }
                    Value::String(s) if s.len() > MAX_STRING_LENGTH => {
                        println!("{}{}: {}", indent, style(key).dim(), style("...").dim());
                    }
                    Value::String(s) => {
                        println!("{}{}: {}", indent, style(key).dim(), style(s).green());
                    }
                    other => {
                        println!("{}{}: {}", indent, style(key).dim(), style(other).blue());
                    }
                }
            }
        }
        Value::Array(arr) => {
            for (i, item) in arr.iter().enumerate() {
                println!("{}{}.", indent, i + 1);
                print_params(item, depth + 1);
            }
        }
        Value::String(s) => println!("{}{}", indent, style(s).green()),
        Value::Null => println!("{}{}", indent, style("null").dim()),
        other => println!("{}{}", indent, style(other).yellow()),
    }
}

fn print_newline() {
    println!();
}

impl Prompt for RustylinePrompt {
    fn render(&mut self, message: &Message) {
        let theme = self.theme_name();

        for content in &message.content {
            match content {
                MessageContent::Text(text) => print_markdown(&text.text, theme),
                MessageContent::ToolRequest(request) => render_tool_request(request, theme),
                MessageContent::ToolResponse(response) => render_tool_response(response, theme),
            }
        }

        print_newline();
        let _ = io::stdout().flush();
    }

    fn show_busy(&mut self) {
        self.spinner = spinner();
        self.spinner
            .start(format!("{}...", get_random_thinking_message()));
    }

    fn hide_busy(&self) {
        self.spinner.stop("");
    }

    fn get_input(&mut self) -> Result<Input> {
        let line = match self.editor()?.readline(PROMPT) {
            Ok(line) => line,
            Err(e) => {
                match e {
                    rustyline::error::ReadlineError::Interrupted
                    | rustyline::error::ReadlineError::Eof => (),
                    _ => eprintln!("Input error: {}", e),
                }
                return Ok(Input {
                    input_type: InputType::Exit,
                    content: None,
                });
            }
        };

        let command = parse_command(&line);
        if let Command::Message(text) = &command {
            let _ = self.editor()?.add_history_entry(text.as_str());
        }

        let input = match command {
            Command::Empty => Input {
                input_type: InputType::AskAgain,
                content: None,
            },
            Command::Exit => Input {
                input_type: InputType::Exit,
                content: None,
            },
            Command::Help => {
                println!("{}", HELP_TEXT);
                Input {
                    input_type: InputType::AskAgain,
                    content: None,
                }
            }
            Command::ToggleTheme => {
                self.theme = match self.theme {
                    Theme::Light => {
                        println!("Switching to Dark theme");
                        Theme::Dark
                    }
                    Theme::Dark => {
                        println!("Switching to Light theme");
                        Theme::Light
                    }
                };
                Input {
                    input_type: InputType::AskAgain,
                    content: None,
                }
            }
            Command::Rate { score, comment } => Input {
                input_type: InputType::Rate(score),
                content: comment,
            },
            Command::InvalidRating(reason) => {
                println!("{}", style(reason).yellow());
                Input {
                    input_type: InputType::AskAgain,
                    content: None,
                }
            }
            Command::Message(text) => Input {
                input_type: InputType::Message,
                content: Some(text),
            },
        };
        Ok(input)
    }

    fn close(&self) {
        // No cleanup required
    }
}
