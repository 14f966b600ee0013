use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Reading position mirrored on every library entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    #[serde(default)]
    pub last_read_page: i64,
    /// Zero while the page count is still unknown.
    #[serde(default)]
    pub total_pages: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComicEntry {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub path: String,
    #[serde(default)]
    pub progress: Progress,
    #[serde(default)]
    pub manga_mode: bool,
    #[serde(default)]
    pub downloaded: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Series {
    #[serde(default)]
    pub comics: Vec<ComicEntry>,
    #[serde(rename = "_hasDetails", default)]
    pub has_details: bool,
    /// Comic count announced by the structure endpoint before details load.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comic_count: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Publisher {
    #[serde(default)]
    pub series: BTreeMap<String, Series>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RootFolder {
    #[serde(default)]
    pub publishers: BTreeMap<String, Publisher>,
}

/// Full library tree: root folder -> publisher -> series -> comics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Library {
    pub roots: BTreeMap<String, RootFolder>,
}

/// Identifies one series inside the tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeriesKey {
    pub root_folder: String,
    pub publisher: String,
    pub series_name: String,
}

impl SeriesKey {
    pub fn new(root_folder: &str, publisher: &str, series_name: &str) -> Self {
        Self {
            root_folder: root_folder.to_string(),
            publisher: publisher.to_string(),
            series_name: series_name.to_string(),
        }
    }
}

impl Library {
    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    pub fn series(&self, key: &SeriesKey) -> Option<&Series> {
        self.roots
            .get(&key.root_folder)?
            .publishers
            .get(&key.publisher)?
            .series
            .get(&key.series_name)
    }

    pub fn series_mut(&mut self, key: &SeriesKey) -> Option<&mut Series> {
        self.roots
            .get_mut(&key.root_folder)?
            .publishers
            .get_mut(&key.publisher)?
            .series
            .get_mut(&key.series_name)
    }

    /// Inserts (or replaces) a series, creating the parent nodes as needed.
    pub fn insert_series(&mut self, key: &SeriesKey, series: Series) {
        self.roots
            .entry(key.root_folder.clone())
            .or_default()
            .publishers
            .entry(key.publisher.clone())
            .or_default()
            .series
            .insert(key.series_name.clone(), series);
    }

    pub fn iter_series(&self) -> impl Iterator<Item = (SeriesKey, &Series)> {
        self.roots.iter().flat_map(|(root, folder)| {
            folder.publishers.iter().flat_map(move |(publisher, p)| {
                p.series
                    .iter()
                    .map(move |(name, series)| (SeriesKey::new(root, publisher, name), series))
            })
        })
    }

    pub fn comics(&self) -> impl Iterator<Item = &ComicEntry> {
        self.roots
            .values()
            .flat_map(|r| r.publishers.values())
            .flat_map(|p| p.series.values())
            .flat_map(|s| s.comics.iter())
    }

    pub fn comics_mut(&mut self) -> impl Iterator<Item = &mut ComicEntry> {
        self.roots
            .values_mut()
            .flat_map(|r| r.publishers.values_mut())
            .flat_map(|p| p.series.values_mut())
            .flat_map(|s| s.comics.iter_mut())
    }

    pub fn find_comic(&self, id: &str) -> Option<&ComicEntry> {
        self.comics().find(|c| c.id == id)
    }

    pub fn find_comic_mut(&mut self, id: &str) -> Option<&mut ComicEntry> {
        self.comics_mut().find(|c| c.id == id)
    }

    pub fn comic_count(&self) -> usize {
        self.comics().count()
    }

    /// True when every series carries its comic list, i.e. the tree came
    /// from a full fetch or every series was expanded.
    pub fn is_fully_loaded(&self) -> bool {
        self.iter_series().all(|(_, s)| s.has_details)
    }

    pub fn mark_fully_loaded(&mut self) {
        for series in self
            .roots
            .values_mut()
            .flat_map(|r| r.publishers.values_mut())
            .flat_map(|p| p.series.values_mut())
        {
            series.has_details = true;
            series.comic_count = Some(series.comics.len());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn comic(id: &str) -> ComicEntry {
        ComicEntry {
            id: id.to_string(),
            name: format!("{}.cbz", id),
            path: format!("/library/{}.cbz", id),
            progress: Progress::default(),
            manga_mode: false,
            downloaded: false,
        }
    }

    #[test]
    fn test_library_parses_server_tree() {
        let json = r#"{
            "Comics": {
                "publishers": {
                    "Marvel": {
                        "series": {
                            "X-Men": {
                                "comics": [
                                    {"id": "a", "name": "X-Men 1", "path": "/c/a.cbz",
                                     "progress": {"lastReadPage": 3, "totalPages": 20}}
                                ],
                                "_hasDetails": true
                            }
                        }
                    }
                }
            }
        }"#;

        let library: Library = serde_json::from_str(json).unwrap();
        let key = SeriesKey::new("Comics", "Marvel", "X-Men");
        let series = library.series(&key).unwrap();
        assert!(series.has_details);
        assert_eq!(library.comic_count(), 1);
        assert_eq!(library.find_comic("a").unwrap().progress.total_pages, 20);
    }

    #[test]
    fn test_fully_loaded_tracks_details() {
        let mut library = Library::default();
        let key = SeriesKey::new("r", "p", "s");
        library.insert_series(
            &key,
            Series {
                comics: vec![comic("a"), comic("b")],
                has_details: false,
                comic_count: None,
            },
        );
        assert!(!library.is_fully_loaded());

        library.mark_fully_loaded();
        assert!(library.is_fully_loaded());
        assert_eq!(library.series(&key).unwrap().comic_count, Some(2));
    }
}
