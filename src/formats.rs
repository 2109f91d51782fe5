use serde::{Deserialize, Serialize};

/// One fetched installment. Never mutated after the fetcher builds it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Episode {
    pub id: String,
    pub url: String,
    pub title: String,
    pub body: String,
    pub next_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryPoint {
    pub first_episode_url: String,
    pub work_title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterRecord {
    pub id: String,
    pub title: String,
    pub content: String,
    pub link: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub translated_at: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkEntry {
    pub title: String,
    pub chapters: Vec<ChapterRecord>,
}

/// Numeric id of an episode URL: the path segment after `episodes`.
pub fn episode_id_from_url(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let mut segments = parsed.path_segments()?;
    segments.find(|segment| *segment == "episodes")?;
    let id = segments.next()?;
    if id.is_empty() || !id.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    Some(id.to_owned())
}
