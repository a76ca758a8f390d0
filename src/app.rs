//! Command interpreter driving one mounted form

use crate::config::TrackerConfig;
use crate::forms::DemoForm;
use crate::state::forms::{FieldCheck, FormTracker, FormValue, SubmitOutcome, Subscription};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use std::io::Write;
use std::str::FromStr;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

/// Grammar of one input line
#[derive(Debug, Parser)]
#[command(name = "form-tracker", no_binary_name = true)]
struct CommandLine {
    #[command(subcommand)]
    command: Command,
}

/// One line of user input
#[derive(Debug, Clone, PartialEq, Subcommand)]
pub enum Command {
    /// Type a value into a field
    Set {
        path: String,
        /// Words of the value; none clears the field
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        value: Vec<String>,
    },
    /// Move focus away from a field
    Blur { path: String },
    /// Add a row (JSON) to the end of an array
    Append {
        array: String,
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        value: Vec<String>,
    },
    /// Insert a row (JSON) before `index`
    Insert {
        array: String,
        index: usize,
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        value: Vec<String>,
    },
    /// Remove the row at `index`
    Remove { array: String, index: usize },
    /// Validate one field, or the whole form
    Validate { path: Option<String> },
    Submit,
    Reset,
    /// Print the current form state
    Show,
    /// Print one value, or all of them
    Get { path: Option<String> },
    #[command(alias = "exit")]
    Quit,
}

/// Parse the words of a JSON argument back into one value
fn json_arg(words: &[String]) -> Result<FormValue> {
    let raw = words.join(" ");
    let value: Value =
        serde_json::from_str(&raw).with_context(|| format!("invalid JSON value `{raw}`"))?;
    Ok(FormValue::from(value))
}

impl FromStr for Command {
    type Err = anyhow::Error;

    fn from_str(line: &str) -> Result<Self> {
        let parsed = CommandLine::try_parse_from(line.split_whitespace())?;
        Ok(parsed.command)
    }
}

/// Main application struct
pub struct App {
    /// Form being edited
    pub form: FormTracker,
    pub kind: DemoForm,
    /// Values accepted by successful submits
    pub submissions: Vec<FormValue>,
    quit: bool,
    _watch: Subscription,
}

impl App {
    pub async fn new(kind: DemoForm, config: TrackerConfig) -> Result<Self> {
        let mut form = kind.mount(config).await?;
        let watch = form.watch(|_, event| {
            let path = event
                .changed_path
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_else(|| "*".to_string());
            tracing::debug!("Value change {:?} at {path}", event.kind);
        });
        tracing::info!("Mounted {kind} form");
        Ok(Self {
            form,
            kind,
            submissions: Vec::new(),
            quit: false,
            _watch: watch,
        })
    }

    pub fn should_quit(&self) -> bool {
        self.quit
    }

    /// Await the async part of a field check, if there is one
    async fn settle(&mut self, check: FieldCheck) {
        if check.is_pending() {
            self.form.settle(check).await;
        }
    }

    /// Run one command and describe the result as JSON
    pub async fn handle_command(&mut self, line: &str) -> Result<Value> {
        let command: Command = line.parse()?;
        tracing::debug!("Handling {command:?}");

        match command {
            Command::Set { path, value } => {
                let check = self.form.change(&path, value.join(" "))?;
                self.settle(check).await;
            }
            Command::Blur { path } => {
                let check = self.form.blur(&path)?;
                self.settle(check).await;
            }
            Command::Append { array, value } => {
                let id = self.form.field_array(&array)?.append(json_arg(&value)?)?;
                tracing::info!("Appended row {id} to {array}");
            }
            Command::Insert { array, index, value } => {
                self.form.field_array(&array)?.insert(index, json_arg(&value)?)?;
            }
            Command::Remove { array, index } => {
                self.form.field_array(&array)?.remove(index)?;
            }
            Command::Validate { path: Some(path) } => {
                let error = self.form.validate_field(&path).await?;
                return Ok(json!({
                    "path": path,
                    "valid": error.is_none(),
                    "error": error,
                }));
            }
            Command::Validate { path: None } => {
                let errors = self.form.validate_all().await;
                return Ok(json!({ "valid": errors.is_empty(), "errors": errors }));
            }
            Command::Submit => return Ok(self.submit().await),
            Command::Reset => self.form.reset(None)?,
            Command::Show => {}
            Command::Get { path: Some(path) } => {
                let value = self.form.get_value(&path)?.cloned().unwrap_or_default();
                return Ok(json!({ "path": path, "value": value }));
            }
            Command::Get { path: None } => return Ok(json!({ "values": self.form.get_values() })),
            Command::Quit => {
                self.quit = true;
                self.form.unmount();
                return Ok(json!({ "status": "bye" }));
            }
        }
        Ok(serde_json::to_value(self.form.snapshot())?)
    }

    /// Print the initial snapshot, then answer each input line with one JSON line
    pub async fn run<R, W>(&mut self, input: R, output: &mut W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: Write,
    {
        let mut lines = input.lines();
        writeln!(output, "{}", serde_json::to_string(&self.form.snapshot())?)?;
        output.flush()?;
        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }

            let response = match self.handle_command(&line).await {
                Ok(response) => response,
                Err(err) => json!({ "error": format!("{err:#}") }),
            };
            writeln!(output, "{}", serde_json::to_string(&response)?)?;
            output.flush()?;

            if self.should_quit() {
                break;
            }
        }
        Ok(())
    }

    async fn submit(&mut self) -> Value {
        let submissions = &mut self.submissions;
        let outcome = self
            .form
            .handle_submit(
                |values| {
                    submissions.push(values.clone());
                    Ok(())
                },
                |errors| tracing::info!("Submit blocked by {} invalid field(s)", errors.len()),
            )
            .await;
        let state = self.form.snapshot();
        match outcome {
            SubmitOutcome::Submitted => json!({ "status": "submitted", "state": state }),
            SubmitOutcome::Rejected(errors) => {
                json!({ "status": "rejected", "errors": errors, "state": state })
            }
            SubmitOutcome::HandlerFailed(message) => {
                json!({ "status": "failed", "message": message, "state": state })
            }
            SubmitOutcome::Ignored => json!({ "status": "ignored" }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod parse {
        use super::*;
        use pretty_assertions::assert_eq;

        fn words(text: &str) -> Vec<String> {
            text.split_whitespace().map(str::to_string).collect()
        }

        #[test]
        fn test_set_keeps_words_of_value() {
            let command: Command = "set address.line1 1007 Mountain Drive".parse().unwrap();
            assert_eq!(
                command,
                Command::Set {
                    path: "address.line1".to_string(),
                    value: words("1007 Mountain Drive"),
                }
            );
        }

        #[test]
        fn test_set_without_value_clears() {
            let command: Command = "set username".parse().unwrap();
            assert_eq!(
                command,
                Command::Set {
                    path: "username".to_string(),
                    value: Vec::new(),
                }
            );
        }

        #[test]
        fn test_set_accepts_leading_hyphen() {
            let command: Command = "set age -4".parse().unwrap();
            assert_eq!(
                command,
                Command::Set {
                    path: "age".to_string(),
                    value: words("-4"),
                }
            );
        }

        #[test]
        fn test_array_commands() {
            assert_eq!(
                "append phone {\"number\": \"555\"}".parse::<Command>().unwrap(),
                Command::Append {
                    array: "phone".to_string(),
                    value: words("{\"number\": \"555\"}"),
                }
            );
            assert_eq!(
                "insert phone 0 {}".parse::<Command>().unwrap(),
                Command::Insert {
                    array: "phone".to_string(),
                    index: 0,
                    value: words("{}"),
                }
            );
            assert_eq!(
                "remove phone 1".parse::<Command>().unwrap(),
                Command::Remove {
                    array: "phone".to_string(),
                    index: 1,
                }
            );
        }

        #[test]
        fn test_json_arg_rejoins_words() {
            assert_eq!(
                json_arg(&words("{\"number\": \"555 0100\"}")).unwrap(),
                FormValue::object().with("number", "555 0100")
            );
            assert!(json_arg(&words("{")).is_err());
        }

        #[test]
        fn test_bad_input() {
            assert!("dance".parse::<Command>().is_err());
            assert!("blur".parse::<Command>().is_err());
            assert!("remove phone one".parse::<Command>().is_err());
            assert!("append phone".parse::<Command>().is_err());
            assert!("".parse::<Command>().is_err());
        }

        #[test]
        fn test_optional_arguments() {
            assert_eq!(
                "validate".parse::<Command>().unwrap(),
                Command::Validate { path: None }
            );
            assert_eq!(
                "get email".parse::<Command>().unwrap(),
                Command::Get {
                    path: Some("email".to_string())
                }
            );
            assert_eq!("exit".parse::<Command>().unwrap(), Command::Quit);
        }
    }

    mod session {
        use super::*;
        use pretty_assertions::assert_eq;

        async fn login() -> App {
            App::new(DemoForm::Login, TrackerConfig::default())
                .await
                .unwrap()
        }

        #[tokio::test]
        async fn test_set_then_get() {
            let mut app = login().await;
            let state = app.handle_command("set email bruce@wayne.com").await.unwrap();
            assert_eq!(state["is_dirty"], true);
            let value = app.handle_command("get email").await.unwrap();
            assert_eq!(value["value"], "bruce@wayne.com");
        }

        #[tokio::test]
        async fn test_submit_flow() {
            let mut app = login().await;
            let response = app.handle_command("submit").await.unwrap();
            assert_eq!(response["status"], "rejected");
            assert_eq!(response["errors"]["password"]["message"], "Password is required");

            app.handle_command("set email bruce@wayne.com").await.unwrap();
            app.handle_command("set password hunter2").await.unwrap();
            let response = app.handle_command("submit").await.unwrap();
            assert_eq!(response["status"], "submitted");
            assert_eq!(app.submissions.len(), 1);
            // Reset after a successful submit
            assert_eq!(response["state"]["values"]["email"], "");
        }

        #[tokio::test]
        async fn test_unknown_field_is_an_error() {
            let mut app = login().await;
            let err = app.handle_command("set nickname robin").await.unwrap_err();
            assert_eq!(err.to_string(), "field `nickname` is not registered");
        }

        #[tokio::test]
        async fn test_field_array_commands() {
            let mut app = App::new(DemoForm::YouTube, TrackerConfig::default())
                .await
                .unwrap();
            app.handle_command("append phone {\"number\": \"555\"}")
                .await
                .unwrap();
            let state = app.handle_command("show").await.unwrap();
            assert_eq!(state["values"]["phone"][1]["number"], "555");
            let state = app.handle_command("remove phone 1").await.unwrap();
            assert_eq!(state["values"]["phone"].as_array().map(Vec::len), Some(1));
        }

        #[tokio::test]
        async fn test_bad_json_row_is_an_error() {
            let mut app = App::new(DemoForm::YouTube, TrackerConfig::default())
                .await
                .unwrap();
            let err = app.handle_command("append phone {").await.unwrap_err();
            assert_eq!(err.to_string(), "invalid JSON value `{`");
            let state = app.handle_command("show").await.unwrap();
            assert_eq!(state["values"]["phone"].as_array().map(Vec::len), Some(1));
        }

        #[tokio::test]
        async fn test_run_answers_each_line() {
            let mut app = login().await;
            let input = "set email bruce@wayne.com\n\nget email\ndance\nquit\nshow\n";
            let mut output = Vec::new();
            app.run(input.as_bytes(), &mut output).await.unwrap();

            let lines: Vec<Value> = String::from_utf8(output)
                .unwrap()
                .lines()
                .map(|line| serde_json::from_str(line).unwrap())
                .collect();
            // Initial snapshot, then one answer per command up to `quit`
            assert_eq!(lines.len(), 5);
            assert_eq!(lines[0]["is_dirty"], false);
            assert_eq!(lines[2]["value"], "bruce@wayne.com");
            assert!(lines[3]["error"].is_string());
            assert_eq!(lines[4]["status"], "bye");
        }

        #[tokio::test]
        async fn test_quit_unmounts() {
            let mut app = login().await;
            app.handle_command("quit").await.unwrap();
            assert!(app.should_quit());
            assert!(!app.form.is_mounted());
        }
    }
}
