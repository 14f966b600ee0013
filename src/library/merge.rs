//! Rules that fold locally recorded facts into a library tree.

use std::collections::HashMap;

use crate::models::{
    ComicEntry, Library, Progress, ProgressEntry, ReadStatus, StatusEntry, StatusTarget,
};

/// `read` jumps to the last page; with no known page count the comic is
/// given a single page so it still renders as finished. `unread` rewinds to
/// the first page and keeps the page count.
pub fn apply_status(progress: &mut Progress, status: ReadStatus) {
    match status {
        ReadStatus::Read => {
            if progress.total_pages > 0 {
                progress.last_read_page = progress.total_pages - 1;
            } else {
                progress.last_read_page = 0;
                progress.total_pages = 1;
            }
        }
        ReadStatus::Unread => progress.last_read_page = 0,
    }
}

/// Applies one status event. Series events cover every comic the tree
/// currently holds for that series. Returns the ids that were touched.
pub fn apply_status_entry(library: &mut Library, entry: &StatusEntry) -> Vec<String> {
    match &entry.target {
        StatusTarget::Comic { comic_id } => match library.find_comic_mut(comic_id) {
            Some(comic) => {
                apply_status(&mut comic.progress, entry.status);
                vec![comic.id.clone()]
            }
            None => Vec::new(),
        },
        StatusTarget::Series(key) => match library.series_mut(key) {
            Some(series) => series
                .comics
                .iter_mut()
                .map(|comic| {
                    apply_status(&mut comic.progress, entry.status);
                    comic.id.clone()
                })
                .collect(),
            None => Vec::new(),
        },
    }
}

pub fn overlay_progress_entry(comic: &mut ComicEntry, entry: &ProgressEntry) {
    comic.progress.last_read_page = entry.last_read_page;
    if let Some(total) = entry.total_pages {
        comic.progress.total_pages = total;
    }
}

/// Local progress wins over whatever the server sent.
pub fn overlay_progress(library: &mut Library, entries: &[ProgressEntry]) -> usize {
    let by_id: HashMap<&str, &ProgressEntry> = entries
        .iter()
        .filter(|e| e.is_valid())
        .map(|e| (e.id.as_str(), e))
        .collect();

    let mut applied = 0;
    for comic in library.comics_mut() {
        if let Some(entry) = by_id.get(comic.id.as_str()) {
            overlay_progress_entry(comic, entry);
            applied += 1;
        }
    }
    applied
}

/// Progress first, then the not yet acknowledged status events in the order
/// they were recorded. A status event does not touch a comic whose stored
/// progress was written at or after the event.
pub fn merge_offline_state(
    library: &mut Library,
    progress: &[ProgressEntry],
    statuses: &[StatusEntry],
) {
    overlay_progress(library, progress);

    let written_at: HashMap<&str, i64> = progress
        .iter()
        .filter(|e| e.is_valid())
        .map(|e| (e.id.as_str(), e.updated_at))
        .collect();
    let outdated = |comic: &ComicEntry, entry: &StatusEntry| {
        written_at
            .get(comic.id.as_str())
            .is_some_and(|at| *at >= entry.timestamp)
    };

    let mut pending: Vec<&StatusEntry> = statuses.iter().filter(|s| !s.synced).collect();
    pending.sort_by_key(|s| (s.timestamp, s.key));
    for entry in pending {
        match &entry.target {
            StatusTarget::Comic { comic_id } => {
                if let Some(comic) = library.find_comic_mut(comic_id) {
                    if !outdated(comic, entry) {
                        apply_status(&mut comic.progress, entry.status);
                    }
                }
            }
            StatusTarget::Series(key) => {
                if let Some(series) = library.series_mut(key) {
                    for comic in series.comics.iter_mut() {
                        if !outdated(comic, entry) {
                            apply_status(&mut comic.progress, entry.status);
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Series, SeriesKey};

    fn comic(id: &str, last: i64, total: i64) -> ComicEntry {
        ComicEntry {
            id: id.to_string(),
            name: id.to_string(),
            path: format!("/c/{}.cbz", id),
            progress: Progress {
                last_read_page: last,
                total_pages: total,
            },
            manga_mode: false,
            downloaded: false,
        }
    }

    fn library_with(comics: Vec<ComicEntry>) -> (Library, SeriesKey) {
        let key = SeriesKey::new("Comics", "Image", "Saga");
        let mut library = Library::default();
        library.insert_series(
            &key,
            Series {
                comics,
                has_details: true,
                comic_count: None,
            },
        );
        (library, key)
    }

    fn progress(id: &str, page: i64, total: Option<i64>) -> ProgressEntry {
        ProgressEntry {
            id: id.to_string(),
            last_read_page: page,
            total_pages: total,
            comic_path: None,
            synced: false,
            updated_at: 0,
        }
    }

    #[test]
    fn test_read_then_unread() {
        let mut p = Progress {
            last_read_page: 4,
            total_pages: 24,
        };

        apply_status(&mut p, ReadStatus::Read);
        assert_eq!(p.last_read_page, 23);
        assert_eq!(p.total_pages, 24);

        apply_status(&mut p, ReadStatus::Unread);
        assert_eq!(p.last_read_page, 0);
        assert_eq!(p.total_pages, 24);
    }

    #[test]
    fn test_read_with_unknown_total() {
        let mut p = Progress::default();
        apply_status(&mut p, ReadStatus::Read);
        assert_eq!(p, Progress { last_read_page: 0, total_pages: 1 });
    }

    #[test]
    fn test_series_status_expands_to_known_comics() {
        let (mut library, key) = library_with(vec![comic("a", 0, 10), comic("b", 2, 5)]);
        let entry = StatusEntry::new(StatusTarget::Series(key), ReadStatus::Read, 1);

        let touched = apply_status_entry(&mut library, &entry);

        assert_eq!(touched, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(library.find_comic("a").unwrap().progress.last_read_page, 9);
        assert_eq!(library.find_comic("b").unwrap().progress.last_read_page, 4);
    }

    #[test]
    fn test_local_progress_overrides_fetched_value() {
        let (mut library, _) = library_with(vec![comic("a", 1, 10), comic("b", 3, 0)]);

        let applied = overlay_progress(
            &mut library,
            &[progress("a", 7, None), progress("b", 2, Some(30)), progress("zz", 1, None)],
        );

        assert_eq!(applied, 2);
        assert_eq!(library.find_comic("a").unwrap().progress, Progress { last_read_page: 7, total_pages: 10 });
        assert_eq!(library.find_comic("b").unwrap().progress, Progress { last_read_page: 2, total_pages: 30 });
    }

    #[test]
    fn test_invalid_progress_is_not_overlaid() {
        let (mut library, _) = library_with(vec![comic("a", 1, 10)]);
        overlay_progress(&mut library, &[progress("a", -3, None)]);
        assert_eq!(library.find_comic("a").unwrap().progress.last_read_page, 1);
    }

    #[test]
    fn test_pending_statuses_apply_after_progress_in_order() {
        let (mut library, _) = library_with(vec![comic("a", 0, 24)]);
        let target = StatusTarget::Comic { comic_id: "a".into() };

        let mut acknowledged = StatusEntry::new(target.clone(), ReadStatus::Unread, 5);
        acknowledged.synced = true;

        merge_offline_state(
            &mut library,
            &[progress("a", 10, None)],
            &[
                StatusEntry::new(target.clone(), ReadStatus::Unread, 1),
                StatusEntry::new(target, ReadStatus::Read, 2),
                acknowledged,
            ],
        );

        assert_eq!(library.find_comic("a").unwrap().progress.last_read_page, 23);
    }

    #[test]
    fn test_page_turn_after_status_wins() {
        let (mut library, key) = library_with(vec![comic("a", 0, 24), comic("b", 0, 10)]);
        let mut turned = progress("a", 5, Some(24));
        turned.updated_at = 200;

        merge_offline_state(
            &mut library,
            &[turned],
            &[
                StatusEntry::new(StatusTarget::Comic { comic_id: "a".into() }, ReadStatus::Read, 100),
                StatusEntry::new(StatusTarget::Series(key), ReadStatus::Read, 150),
            ],
        );

        assert_eq!(library.find_comic("a").unwrap().progress.last_read_page, 5);
        assert_eq!(library.find_comic("b").unwrap().progress.last_read_page, 9);
    }

    #[test]
    fn test_status_after_page_turn_wins() {
        let (mut library, _) = library_with(vec![comic("a", 0, 24)]);
        let mut turned = progress("a", 5, Some(24));
        turned.updated_at = 100;

        merge_offline_state(
            &mut library,
            &[turned],
            &[StatusEntry::new(StatusTarget::Comic { comic_id: "a".into() }, ReadStatus::Read, 200)],
        );

        assert_eq!(library.find_comic("a").unwrap().progress.last_read_page, 23);
    }
}
