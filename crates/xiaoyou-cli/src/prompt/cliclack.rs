use std::io::{self, Write};

use anyhow::Result;
use bat::WrappingMode;
use cliclack::{input, spinner};
use console::style;
use xiaoyou::models::content::{ContentPart, ImageRef};

use super::{Input, InputType, Prompt, Theme};

pub struct CliclackPrompt {
    spinner: Option<cliclack::ProgressBar>,
    input_mode: InputMode,
    theme: Theme,
}

enum InputMode {
    Singleline,
    Multiline,
}

impl CliclackPrompt {
    pub fn new() -> Self {
        CliclackPrompt {
            spinner: None,
            input_mode: InputMode::Singleline,
            theme: Theme::Dark,
        }
    }

    fn theme_name(&self) -> &'static str {
        match self.theme {
            Theme::Light => "GitHub",
            Theme::Dark => "zenburn",
        }
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

fn print_image(image: &ImageRef) {
    let alt = if image.alt.is_empty() {
        "图片"
    } else {
        image.alt.as_str()
    };
    println!(
        "{} {}",
        style(format!("[{}]", alt)).cyan().bold(),
        style(&image.source).dim().underlined()
    );
}

impl Prompt for CliclackPrompt {
    fn render(&mut self, parts: &[ContentPart]) {
        let theme = self.theme_name();
        for part in parts {
            match part {
                ContentPart::Text { text } => print_markdown(text, theme),
                ContentPart::Image(image) => print_image(image),
            }
            println!();
        }
        let _ = io::stdout().flush();
    }

    fn render_notice(&mut self, notice: &str) {
        println!("{}", style(notice).yellow());
    }

    fn show_busy(&mut self) {
        let spinner = spinner();
        spinner.start("小优正在思考…");
        self.spinner = Some(spinner);
    }

    fn hide_busy(&mut self) {
        if let Some(spinner) = self.spinner.take() {
            spinner.stop("");
        }
    }

    fn get_input(&mut self) -> Result<Input> {
        let mut input = input("提问：         [帮助: /?]").placeholder("");
        match self.input_mode {
            InputMode::Multiline => input = input.multiline(),
            InputMode::Singleline => (),
        }
        let message_text: String = input.interact()?;
        let message_text = message_text.trim();

        if message_text.eq_ignore_ascii_case("exit")
            || message_text.eq_ignore_ascii_case("/exit")
            || message_text.eq_ignore_ascii_case("/quit")
        {
            return Ok(Input {
                input_type: InputType::Exit,
                content: None,
            });
        }

        if message_text.eq_ignore_ascii_case("/voice") {
            return Ok(Input {
                input_type: InputType::Voice,
                content: None,
            });
        }

        let command = if message_text.eq_ignore_ascii_case("/m") {
            self.input_mode = InputMode::Multiline;
            true
        } else if message_text.eq_ignore_ascii_case("/s") {
            self.input_mode = InputMode::Singleline;
            true
        } else if message_text.eq_ignore_ascii_case("/t") {
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
            true
        } else if message_text.eq_ignore_ascii_case("/?") {
            println!("Commands:");
            println!("/exit - Exit the session");
            println!("/voice - Dictate a question");
            println!("/m - Switch to multiline input mode");
            println!("/s - Switch to singleline input mode");
            println!("/t - Toggle Light/Dark theme");
            println!("/? - Display this help message");
            println!("Ctrl+C - Stop the answer that is currently streaming");
            true
        } else {
            false
        };

        if command {
            return Ok(Input {
                input_type: InputType::AskAgain,
                content: None,
            });
        }
        Ok(Input {
            input_type: InputType::Message,
            content: Some(message_text.to_string()),
        })
    }

    fn close(&self) {
        // No cleanup required
    }
}
