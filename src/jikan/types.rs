/// A single anime entry, as handed to the presentation layer.
///
/// Built either from a fresh API record or from a cached row; callers can't
/// tell which.
#[derive(Debug, Clone, PartialEq)]
pub struct ListItem {
  pub id: i64,
  pub title: String,
  pub title_japanese: Option<String>,
  pub image_url: Option<String>,
  pub large_image_url: Option<String>,
  pub score: Option<f64>,
  pub episodes: Option<i64>,
  pub kind: Option<String>, // "TV", "Movie", "OVA", ...
  pub status: Option<String>,
  pub airing: Option<bool>,
  pub rank: Option<i64>,
  pub rating: Option<String>,
  pub synopsis: Option<String>,
  pub genres: Vec<String>,
  pub trailer: TrailerReference,
}

/// What the UI can do with a trailer.
///
/// Resolved once with a fixed priority; see [`TrailerReference::resolve`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrailerReference {
  /// A video id that can be handed to a native player
  PlayableById(String),
  /// A direct link that can be opened externally
  ExternalLink(String),
  /// Only an embed URL is known, which does not play reliably
  UnavailableEmbed(String),
  /// No trailer at all
  None,
}

impl TrailerReference {
  /// Pick the most usable trailer reference.
  ///
  /// Priority: playable id, then direct url, then embed url. Blank strings
  /// are treated as missing.
  pub fn resolve(youtube_id: Option<&str>, url: Option<&str>, embed_url: Option<&str>) -> Self {
    if let Some(id) = non_blank(youtube_id) {
      TrailerReference::PlayableById(id.to_string())
    } else if let Some(url) = non_blank(url) {
      TrailerReference::ExternalLink(url.to_string())
    } else if let Some(embed) = non_blank(embed_url) {
      TrailerReference::UnavailableEmbed(embed.to_string())
    } else {
      TrailerReference::None
    }
  }

  /// Short label for list rendering.
  pub fn label(&self) -> &'static str {
    match self {
      TrailerReference::PlayableById(_) => "trailer",
      TrailerReference::ExternalLink(_) => "trailer (external)",
      TrailerReference::UnavailableEmbed(_) => "trailer unavailable",
      TrailerReference::None => "no trailer",
    }
  }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
  value.filter(|v| !v.trim().is_empty())
}

/// One page worth of list data.
#[derive(Debug, Clone, PartialEq)]
pub struct PageResult {
  pub items: Vec<ListItem>,
  pub current_page: i64,
  pub has_next_page: bool,
}
