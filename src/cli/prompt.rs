//! Interactive confirmations.

use console::{style, Term};

/// Ask a yes/no question; anything but `y`/`yes` is a no.
pub fn confirm(question: &str) -> std::io::Result<bool> {
    let term = Term::stdout();
    term.write_str(&format!("{} (y/n): ", question))?;
    let answer = term.read_line()?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}

/// Require the operator to type `phrase` exactly.
pub fn confirm_phrase(warning: &str, phrase: &str) -> std::io::Result<bool> {
    let term = Term::stdout();
    term.write_line(&format!("{}", style(warning).red().bold()))?;
    term.write_str(&format!("Type {} to confirm: ", style(phrase).bold()))?;
    let answer = term.read_line()?;
    Ok(answer.trim() == phrase)
}
