//! Choice prompts answered on stdin.

use async_trait::async_trait;
use saga_core::{PromptAnswer, PromptRequest, Prompter};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::Mutex;

/// Stdin lines, shared by the command loop and the prompter.
pub type Input = Arc<Mutex<Lines<BufReader<Stdin>>>>;

pub fn stdin_input() -> Input {
    Arc::new(Mutex::new(BufReader::new(tokio::io::stdin()).lines()))
}

/// Asks on stdout and reads the answer from the shared input.
pub struct StdinPrompter {
    input: Input,
}

impl StdinPrompter {
    pub fn new(input: Input) -> Self {
        Self { input }
    }
}

#[async_trait]
impl Prompter for StdinPrompter {
    async fn prompt(&self, request: PromptRequest) -> PromptAnswer {
        println!("[CHOICE] {}: {}", request.title, request.content);
        for (i, option) in request.options.iter().enumerate() {
            println!("  {}. {option}", i + 1);
        }
        println!("  (number or name, empty to cancel)");

        let mut input = self.input.lock().await;
        let line = match input.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => return PromptAnswer::Cancelled,
            Err(e) => {
                tracing::warn!(error = %e, "failed to read choice");
                return PromptAnswer::Cancelled;
            }
        };
        interpret(&line, &request.options)
    }
}

fn interpret(line: &str, options: &[String]) -> PromptAnswer {
    let line = line.trim();
    if line.is_empty() || line.eq_ignore_ascii_case("cancel") {
        return PromptAnswer::Cancelled;
    }
    match line.parse::<usize>() {
        Ok(n) if n >= 1 && n <= options.len() => PromptAnswer::Selected(options[n - 1].clone()),
        _ => PromptAnswer::Selected(line.to_string()),
    }
}
