//! Domain types for exportable documents.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// The three kinds of documents the export pipeline can render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DocumentKind {
    Resume,
    CoverLetter,
    InterviewGuide,
}

impl DocumentKind {
    /// Returns the slug used in routes, ticket canonicalization and storage.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Resume => "resume",
            Self::CoverLetter => "cover-letter",
            Self::InterviewGuide => "interview-guide",
        }
    }

    /// Returns the human-readable heading for print views.
    pub fn display_name(self) -> &'static str {
        match self {
            Self::Resume => "Resume",
            Self::CoverLetter => "Cover Letter",
            Self::InterviewGuide => "Interview Guide",
        }
    }

    /// Returns the attachment filename for a rendered export.
    pub fn export_filename(self) -> &'static str {
        match self {
            Self::Resume => "resume.pdf",
            Self::CoverLetter => "cover-letter.pdf",
            Self::InterviewGuide => "interview-guide.pdf",
        }
    }

    /// Returns the path of the gated print view for this kind.
    pub fn print_path(self) -> &'static str {
        match self {
            Self::Resume => "/render-view/resume",
            Self::CoverLetter => "/render-view/cover-letter",
            Self::InterviewGuide => "/render-view/interview-guide",
        }
    }

    pub fn all() -> &'static [DocumentKind] {
        &[Self::Resume, Self::CoverLetter, Self::InterviewGuide]
    }
}

impl Display for DocumentKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "resume" => Ok(Self::Resume),
            "cover-letter" => Ok(Self::CoverLetter),
            "interview-guide" => Ok(Self::InterviewGuide),
            _ => Err(()),
        }
    }
}

/// A stored document, owned by the document subsystem. The export core only
/// needs existence, ownership and a textual body to render.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentRecord {
    pub id: String,
    pub kind: DocumentKind,
    pub owner_account_id: String,
    pub title: String,
    pub body: String,
    pub updated_at: OffsetDateTime,
}
