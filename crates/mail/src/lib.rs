//! `coffer-mail` — outbound email.
//!
//! A `Mailer` trait with an SES-backed implementation, plus the template
//! renderer for transactional mails.

pub mod ses;
pub mod template;

pub use ses::{Mailer, SesMailer};
pub use template::{EmailGenerator, RenderedEmail};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MailError {
    #[error("template {0} could not be read")]
    Template(String),

    #[error("mail request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("mail provider returned {status}: {body}")]
    Rejected { status: u16, body: String },
}
