use console::Term;

/// Yes/no confirmation from the user.
pub trait Confirm {
    fn confirm(&self, question: &str) -> bool;
}

/// Asks on the terminal; anything but `y`/`yes` is a no.
pub struct TermConfirm;

impl Confirm for TermConfirm {
    fn confirm(&self, question: &str) -> bool {
        let term = Term::stderr();
        if term.write_str(&format!("{} (y/N) ", question)).is_err() {
            return false;
        }
        match term.read_line() {
            Ok(answer) => is_yes(&answer),
            Err(e) => {
                tracing::debug!("Could not read confirmation: {}", e);
                false
            }
        }
    }
}

/// Non-interactive runs (`--yes`).
pub struct AssumeYes;

impl Confirm for AssumeYes {
    fn confirm(&self, question: &str) -> bool {
        tracing::debug!("Assuming yes: {}", question);
        true
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}
