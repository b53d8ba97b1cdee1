//! Book payloads exchanged with the gateway.
//!
//! The scan response is consumed, not owned: beyond deserialization the
//! pipeline treats it as opaque and only shapes identities out of it for the
//! enrichment and recommendation collaborators.

use serde::{Deserialize, Serialize};

/// Normalized spine location within the photo, fractions of width/height.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

/// One detected book as returned by the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichedBook {
    pub title: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub isbn: Option<String>,
    #[serde(default)]
    pub cover_url: Option<String>,
    #[serde(default)]
    pub publisher: Option<String>,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub subjects: Option<Vec<String>>,
    #[serde(default)]
    pub bbox: Option<BoundingBox>,
    /// Raw spine text the detection was derived from.
    #[serde(default)]
    pub original_text: Option<String>,
}

/// Successful scan payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanResult {
    pub books: Vec<EnrichedBook>,
    pub model_used: String,
}

/// Outcome of one upload. The gateway contract may evolve, so a 2xx body
/// that does not deserialize into [`ScanResult`] is kept as raw text instead
/// of failing the scan.
#[derive(Debug, Clone)]
pub enum ScanOutcome {
    Books(ScanResult),
    Raw(String),
}

impl ScanOutcome {
    pub fn books(&self) -> &[EnrichedBook] {
        match self {
            ScanOutcome::Books(result) => &result.books,
            ScanOutcome::Raw(_) => &[],
        }
    }
}

/// Minimal identity forwarded to the enrichment collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookIdentity {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub isbn: Option<String>,
}

impl From<&EnrichedBook> for BookIdentity {
    fn from(book: &EnrichedBook) -> Self {
        Self {
            title: book.title.clone(),
            author: book.author.clone(),
            isbn: book.isbn.clone(),
        }
    }
}

impl BookIdentity {
    /// Shape a scan result into the identity list the collaborators accept.
    pub fn from_books(books: &[EnrichedBook]) -> Vec<Self> {
        books.iter().map(Self::from).collect()
    }
}

/// User taste profile forwarded alongside identities for recommendations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserPreferences {
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default)]
    pub languages: Vec<String>,
}

/// One scored book from the recommendation collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredBook {
    pub title: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub cover_url: Option<String>,
    pub score: f32,
    #[serde(default)]
    pub recommendation: String,
    #[serde(default)]
    pub match_quality: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_result_deserializes_minimal_books() {
        let json = r#"{
            "books": [
                {"title": "The Left Hand of Darkness"},
                {"title": "Dune", "author": "Frank Herbert", "year": 1965,
                 "bbox": {"x": 0.1, "y": 0.0, "w": 0.05, "h": 0.9}}
            ],
            "model_used": "vision-large"
        }"#;

        let result: ScanResult = serde_json::from_str(json).unwrap();
        assert_eq!(result.books.len(), 2);
        assert_eq!(result.model_used, "vision-large");
        assert!(result.books[0].author.is_none());
        assert_eq!(result.books[1].year, Some(1965));
        assert_eq!(result.books[1].bbox.as_ref().unwrap().w, 0.05);
    }

    #[test]
    fn identities_drop_enrichment_fields() {
        let books = vec![EnrichedBook {
            title: "Dune".to_string(),
            author: Some("Frank Herbert".to_string()),
            isbn: None,
            cover_url: Some("https://covers.example.com/dune.jpg".to_string()),
            publisher: Some("Chilton".to_string()),
            year: Some(1965),
            subjects: None,
            bbox: None,
            original_text: Some("DUNE Herbert".to_string()),
        }];

        let identities = BookIdentity::from_books(&books);
        assert_eq!(identities.len(), 1);
        let json = serde_json::to_string(&identities[0]).unwrap();
        assert!(json.contains("Dune"));
        assert!(json.contains("Frank Herbert"));
        assert!(!json.contains("covers.example.com"));
        // Absent isbn is omitted entirely, not serialized as null
        assert!(!json.contains("isbn"));
    }

    #[test]
    fn raw_outcome_has_no_books() {
        let outcome = ScanOutcome::Raw("ok".to_string());
        assert!(outcome.books().is_empty());
    }
}
