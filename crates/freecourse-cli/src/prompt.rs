//! Interactive credential prompt.

use std::io;

use dialoguer::console::Term;
use dialoguer::Password;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use freecourse::{CredentialPrompt, LoginError, LoginResult};

/// Asks for an email and password on the terminal. The password is not
/// echoed.
///
/// Ctrl-C or Ctrl-D at either prompt cancels the login.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalPrompt;

impl CredentialPrompt for TerminalPrompt {
    fn prompt(&self) -> LoginResult<(String, String)> {
        let mut editor = DefaultEditor::new()
            .map_err(|e| LoginError::Fatal(format!("cannot open terminal: {e}")))?;

        let email = read_non_empty(&mut editor, "Email: ")?;
        let password = Password::new()
            .with_prompt("Password")
            .interact_on(&Term::stderr())
            .map_err(password_error)?;
        Ok((email.trim().to_string(), password))
    }
}

fn read_non_empty(editor: &mut DefaultEditor, prompt: &str) -> LoginResult<String> {
    loop {
        match editor.readline(prompt) {
            Ok(line) if line.trim().is_empty() => continue,
            Ok(line) => return Ok(line),
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => return Err(LoginError::Cancelled),
            Err(e) => return Err(LoginError::Fatal(format!("cannot read input: {e}"))),
        }
    }
}

fn password_error(error: dialoguer::Error) -> LoginError {
    let dialoguer::Error::IO(e) = error;
    match e.kind() {
        io::ErrorKind::Interrupted | io::ErrorKind::UnexpectedEof => LoginError::Cancelled,
        _ => LoginError::Fatal(format!("cannot read password: {e}")),
    }
}
