//! Interactive prompts with a plain stdin fallback.

use std::io::{self, IsTerminal, Write};

use dialoguer::{theme::ColorfulTheme, Confirm, Input, Password, Select};

fn use_dialoguer() -> bool {
    std::io::stdin().is_terminal() && std::io::stdout().is_terminal()
}

fn read_line(prompt: &str) -> anyhow::Result<String> {
    print!("{prompt}");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

pub(crate) fn prompt_string(label: &str, default: &str) -> anyhow::Result<String> {
    if use_dialoguer() {
        let theme = ColorfulTheme::default();
        let input = Input::<String>::with_theme(&theme)
            .with_prompt(label)
            .default(default.to_string())
            .allow_empty(true)
            .interact_text()?;
        return Ok(input);
    }
    let line = if default.is_empty() {
        read_line(&format!("{label}: "))?
    } else {
        read_line(&format!("{label} [{default}]: "))?
    };
    if line.is_empty() {
        Ok(default.to_string())
    } else {
        Ok(line)
    }
}

/// Like [`prompt_string`] but hides the input; an empty answer is allowed.
pub(crate) fn prompt_secret(label: &str) -> anyhow::Result<String> {
    if use_dialoguer() {
        let theme = ColorfulTheme::default();
        let input = Password::with_theme(&theme)
            .with_prompt(label)
            .allow_empty_password(true)
            .interact()?;
        return Ok(input);
    }
    read_line(&format!("{label}: "))
}

pub(crate) fn prompt_choice(
    label: &str,
    options: &[&str],
    default: &str,
) -> anyhow::Result<String> {
    if use_dialoguer() {
        let theme = ColorfulTheme::default();
        let default_index = options
            .iter()
            .position(|opt| opt.eq_ignore_ascii_case(default))
            .unwrap_or(0);
        let selection = Select::with_theme(&theme)
            .with_prompt(label)
            .items(options)
            .default(default_index)
            .interact()?;
        return Ok(options[selection].to_string());
    }
    let line = read_line(&format!("{label} ({}) [{default}]: ", options.join("/")))?;
    let choice = if line.is_empty() { default.to_string() } else { line };
    match options
        .iter()
        .find(|opt| opt.eq_ignore_ascii_case(choice.as_str()))
    {
        Some(opt) => Ok((*opt).to_string()),
        None => anyhow::bail!(
            "Invalid choice '{choice}'. Expected one of: {}",
            options.join(", ")
        ),
    }
}

pub(crate) fn prompt_yes_no(label: &str, default: bool) -> anyhow::Result<bool> {
    if use_dialoguer() {
        let theme = ColorfulTheme::default();
        let confirmed = Confirm::with_theme(&theme)
            .with_prompt(label)
            .default(default)
            .interact()?;
        return Ok(confirmed);
    }
    let default_text = if default { "Y/n" } else { "y/N" };
    let line = read_line(&format!("{label} [{default_text}]: "))?.to_ascii_lowercase();
    match line.as_str() {
        "" => Ok(default),
        "y" | "yes" => Ok(true),
        "n" | "no" => Ok(false),
        _ => anyhow::bail!("Please answer yes or no."),
    }
}
