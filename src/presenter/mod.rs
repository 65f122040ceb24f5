//! Presentation layer.
//!
//! The sequencer reports every frame change to a [`Presenter`] and asks it for the two user
//! decisions of a run: accepting an offered update and confirming a cancellation. Prompts may
//! block; the sequencer calls them from a blocking task.

use crate::core::ErrorContext;
use crate::sequencer::Frame;
use colored::Colorize;
use std::io::{self, BufRead, IsTerminal, Write};
use std::sync::atomic::{AtomicBool, Ordering};

/// An update offered to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateOffer {
    pub product: String,
    pub installed_version: String,
    pub new_version: String,
    pub changes: String,
}

/// Receives frame changes and answers user decisions.
pub trait Presenter: Send + Sync {
    /// Called once per step transition with the frame of the new phase.
    fn frame_changed(&self, frame: Frame);

    /// Renders the UpdateAvailable frame; `false` declines the update.
    fn confirm_update(&self, offer: &UpdateOffer) -> bool;

    /// Asked when a close is requested during work that needs confirmation.
    fn confirm_cancel(&self) -> bool;

    /// "What's new" text re-shown after a self-update handoff.
    fn show_changes(&self, _changes: &str) {}

    fn show_error(&self, error: &ErrorContext);

    /// Makes a hidden presenter visible (quick check found an update).
    fn reveal(&self) {}
}

/// How much the console presenter prints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Visible,
    /// Nothing until [`Presenter::reveal`]
    Hidden,
    /// Never prints and never prompts
    Silent,
}

/// Terminal presenter. Prompts are answered from stdin; without a terminal every prompt takes
/// its default answer (proceed with the update, confirm the cancel).
#[derive(Debug)]
pub struct ConsolePresenter {
    silent: bool,
    hidden: AtomicBool,
}

impl ConsolePresenter {
    pub fn new(visibility: Visibility) -> Self {
        Self {
            silent: visibility == Visibility::Silent,
            hidden: AtomicBool::new(visibility == Visibility::Hidden),
        }
    }

    fn visible(&self) -> bool {
        !self.silent && !self.hidden.load(Ordering::SeqCst)
    }

    fn prompt(question: &str, default: bool) -> bool {
        if !io::stdin().is_terminal() {
            return default;
        }
        let hint = if default { "[Y/n]" } else { "[y/N]" };
        print!("{} ", format!("{question} {hint}:").green());
        let _ = io::stdout().flush();

        let mut response = String::new();
        if io::stdin().lock().read_line(&mut response).is_err() {
            return default;
        }
        match response.trim().to_lowercase().as_str() {
            "" => default,
            "y" | "yes" => true,
            _ => false,
        }
    }
}

impl Presenter for ConsolePresenter {
    fn frame_changed(&self, frame: Frame) {
        if !self.visible() {
            return;
        }
        let title = match frame {
            Frame::Welcome => "Welcome",
            Frame::Checking => "Checking for updates...",
            Frame::UpdateAvailable => "Update available",
            Frame::InstallUpdates => "Installing the update...",
            Frame::Uninstall => "Uninstalling...",
            Frame::Error => "The update failed",
            Frame::WelcomeFinish => "Finished",
        };
        println!("{} {}", "==>".cyan().bold(), title);
    }

    fn confirm_update(&self, offer: &UpdateOffer) -> bool {
        if !self.visible() {
            return true;
        }
        println!(
            "{} {} {} -> {}",
            "==>".cyan().bold(),
            offer.product.bold(),
            offer.installed_version.yellow(),
            offer.new_version.green()
        );
        if !offer.changes.trim().is_empty() {
            println!("{}", offer.changes.trim());
        }
        Self::prompt("Install this update?", true)
    }

    fn confirm_cancel(&self) -> bool {
        if !self.visible() {
            return true;
        }
        Self::prompt("Cancel the update?", true)
    }

    fn show_changes(&self, changes: &str) {
        if self.visible() && !changes.trim().is_empty() {
            println!("{}", changes.trim());
        }
    }

    fn show_error(&self, error: &ErrorContext) {
        if !self.silent {
            error.display();
        }
    }

    fn reveal(&self) {
        self.hidden.store(false, Ordering::SeqCst);
    }
}
