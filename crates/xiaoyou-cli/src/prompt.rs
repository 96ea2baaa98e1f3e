use anyhow::Result;
use xiaoyou::models::content::ContentPart;

pub mod cliclack;

pub trait Prompt {
    fn render(&mut self, parts: &[ContentPart]);
    /// Status lines from the client itself, not part of any answer
    fn render_notice(&mut self, notice: &str);
    fn get_input(&mut self) -> Result<Input>;
    fn show_busy(&mut self);
    fn hide_busy(&mut self);
    fn close(&self);
    fn ready(&self) {
        println!("\n");
        println!("小优已就绪！输入你的问题，例如：如何避免运动损伤？");
        println!("\n");
    }
}

pub struct Input {
    pub input_type: InputType,
    pub content: Option<String>, // Only set for messages
}

pub enum InputType {
    AskAgain, // Ask the user for input again. Control flow command.
    Message,  // User sent a message
    Voice,    // User asked to dictate a message
    Exit,     // User wants to exit the session
}

pub enum Theme {
    Light,
    Dark,
}
