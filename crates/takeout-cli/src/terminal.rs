//! Interactive selection on stdin.

use std::io::Write;

use async_trait::async_trait;
use takeout_client::{ClientError, SelectionProvider};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

/// Highest meal number offered on the built-in menus.
const MAX_MEAL: u32 = 10;

pub struct TerminalSelection {
    lines: Lines<BufReader<Stdin>>,
}

impl TerminalSelection {
    pub fn new() -> Self {
        Self {
            lines: BufReader::new(tokio::io::stdin()).lines(),
        }
    }

    /// Prompt until the user enters a number in `1..=max`.
    async fn read_number(&mut self, prompt: &str, max: u32) -> Result<u32, ClientError> {
        loop {
            print!("{prompt}");
            std::io::stdout()
                .flush()
                .map_err(|e| ClientError::Other(e.into()))?;
            let line = self
                .lines
                .next_line()
                .await
                .map_err(|e| ClientError::Other(e.into()))?
                .ok_or(ClientError::NoSelection)?;
            match parse_choice(&line, max) {
                Some(n) => return Ok(n),
                None => println!("Invalid choice."),
            }
        }
    }
}

impl Default for TerminalSelection {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SelectionProvider for TerminalSelection {
    async fn choose_restaurant(&mut self, options: &str) -> Result<String, ClientError> {
        println!("{options}");
        let count = u32::try_from(options.lines().skip(1).count()).unwrap_or(u32::MAX);
        let choice = self
            .read_number(
                "Enter the number of the restaurant you want to order from: ",
                count,
            )
            .await?;
        Ok(choice.to_string())
    }

    async fn choose_meal(&mut self, menu: &str) -> Result<String, ClientError> {
        println!("Menu received:\n{menu}\n");
        let meal = self
            .read_number("Enter the number of the meal you want to order: ", MAX_MEAL)
            .await?;
        Ok(format!("ORDER: {meal}"))
    }

    async fn unavailable(&mut self, notice: &str) {
        println!("{notice}");
    }
}

fn parse_choice(line: &str, max: u32) -> Option<u32> {
    line.trim().parse().ok().filter(|n| (1..=max).contains(n))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn choices_must_be_in_range() {
        assert_eq!(parse_choice("2\n", 3), Some(2));
        assert_eq!(parse_choice(" 10 ", MAX_MEAL), Some(10));
        assert_eq!(parse_choice("0", 3), None);
        assert_eq!(parse_choice("4", 3), None);
        assert_eq!(parse_choice("pizza", 3), None);
    }
}
