//! Record filters.
//!
//! A filter is a list of clauses. A record passes when it satisfies every
//! clause; within a clause, matching any one item is enough.
//!
//! `SelectedTags` keeps records carrying one of the listed tags, while
//! `FilteredTags` removes them. `ManuallyFiltered` carries an explicit
//! [`Polarity`] because callers use a picked set of records both ways.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::record::{Record, TypeCatalog};
use crate::types::{CategoryId, RecordId, RecordTypeId, TagId};
use crate::window::Window;

/// One filter clause.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordsFilter {
    /// Record type is one of the listed types.
    Activity(Vec<RecordTypeId>),
    /// Record type belongs to a listed category (or to none).
    Category(Vec<CategoryItem>),
    Comment(Vec<CommentItem>),
    /// Record intersects the window.
    Date(Window),
    /// Record carries one of the listed tags (or has none).
    SelectedTags(Vec<TagItem>),
    /// Record must not carry any of the listed tags (or have none).
    FilteredTags(Vec<TagItem>),
    ManuallyFiltered {
        record_ids: Vec<RecordId>,
        polarity: Polarity,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoryItem {
    Categorized(CategoryId),
    Uncategorized,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommentItem {
    NoComment,
    AnyComment,
    /// Exact comment text.
    Text(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagItem {
    Tagged(TagId),
    Untagged,
}

/// Whether a manually picked record set is kept or removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Polarity {
    /// Only the listed records pass.
    Include,
    /// The listed records are removed.
    Exclude,
}

/// Clause discriminant, without payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterKind {
    Activity,
    Category,
    Comment,
    Date,
    SelectedTags,
    FilteredTags,
    ManuallyFiltered,
}

impl FilterKind {
    pub const ALL: [Self; 7] = [
        Self::Activity,
        Self::Category,
        Self::Comment,
        Self::Date,
        Self::SelectedTags,
        Self::FilteredTags,
        Self::ManuallyFiltered,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Activity => "activity",
            Self::Category => "category",
            Self::Comment => "comment",
            Self::Date => "date",
            Self::SelectedTags => "selected tags",
            Self::FilteredTags => "filtered tags",
            Self::ManuallyFiltered => "manually filtered",
        }
    }
}

impl RecordsFilter {
    pub const fn kind(&self) -> FilterKind {
        match self {
            Self::Activity(_) => FilterKind::Activity,
            Self::Category(_) => FilterKind::Category,
            Self::Comment(_) => FilterKind::Comment,
            Self::Date(_) => FilterKind::Date,
            Self::SelectedTags(_) => FilterKind::SelectedTags,
            Self::FilteredTags(_) => FilterKind::FilteredTags,
            Self::ManuallyFiltered { .. } => FilterKind::ManuallyFiltered,
        }
    }

    /// Evaluates this clause against one record.
    pub fn matches(&self, record: &Record, catalog: &TypeCatalog) -> bool {
        match self {
            Self::Activity(type_ids) => type_ids.contains(&record.type_id),
            Self::Category(items) => {
                let categories = catalog.categories(record.type_id);
                items.iter().any(|item| match item {
                    CategoryItem::Categorized(id) => categories.contains(id),
                    CategoryItem::Uncategorized => categories.is_empty(),
                })
            }
            Self::Comment(items) => items.iter().any(|item| match item {
                CommentItem::NoComment => record.comment.is_empty(),
                CommentItem::AnyComment => !record.comment.is_empty(),
                CommentItem::Text(text) => record.comment == *text,
            }),
            Self::Date(window) => window.overlaps(record.time_started, record.time_ended),
            Self::SelectedTags(items) => carries_any_tag(record, items),
            Self::FilteredTags(items) => !carries_any_tag(record, items),
            Self::ManuallyFiltered {
                record_ids,
                polarity,
            } => {
                let listed = record.id.is_some_and(|id| record_ids.contains(&id));
                match polarity {
                    Polarity::Include => listed,
                    Polarity::Exclude => !listed,
                }
            }
        }
    }
}

fn carries_any_tag(record: &Record, items: &[TagItem]) -> bool {
    items.iter().any(|item| match item {
        TagItem::Tagged(id) => record.tag_ids.contains(id),
        TagItem::Untagged => record.tag_ids.is_empty(),
    })
}

/// True when the record satisfies every clause. No clauses match everything.
pub fn matches(record: &Record, filters: &[RecordsFilter], catalog: &TypeCatalog) -> bool {
    filters.iter().all(|filter| filter.matches(record, catalog))
}

/// Keeps the records that satisfy every clause.
pub fn apply_all(
    records: impl IntoIterator<Item = Record>,
    filters: &[RecordsFilter],
    catalog: &TypeCatalog,
) -> Vec<Record> {
    let mut removed = 0usize;
    let kept: Vec<Record> = records
        .into_iter()
        .filter(|record| {
            let keep = matches(record, filters, catalog);
            if !keep {
                removed += 1;
            }
            keep
        })
        .collect();
    if removed > 0 {
        tracing::debug!(removed, kept = kept.len(), clauses = filters.len(), "filtered records");
    }
    kept
}

/// True if the comment items select records without a comment.
pub fn has_no_comment(items: &[CommentItem]) -> bool {
    items.contains(&CommentItem::NoComment)
}

/// True if the comment items select records with any comment.
pub fn has_any_comment(items: &[CommentItem]) -> bool {
    items.contains(&CommentItem::AnyComment)
}

/// Exact comment texts among the items.
pub fn comment_texts(items: &[CommentItem]) -> impl Iterator<Item = &str> {
    items.iter().filter_map(|item| match item {
        CommentItem::Text(text) => Some(text.as_str()),
        CommentItem::NoComment | CommentItem::AnyComment => None,
    })
}

/// Comment previews longer than this are truncated.
const COMMENT_PREVIEW_CHARS: usize = 10;

impl fmt::Display for RecordsFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.kind().as_str();
        match self {
            Self::Activity(ids) => write!(f, "{name} ({})", ids.len()),
            Self::Category(items) => write!(f, "{name} ({})", items.len()),
            Self::SelectedTags(items) | Self::FilteredTags(items) => {
                write!(f, "{name} ({})", items.len())
            }
            Self::ManuallyFiltered { record_ids, .. } => write!(f, "{name} ({})", record_ids.len()),
            Self::Comment(items) => {
                if has_no_comment(items) {
                    write!(f, "{name} (no comment)")
                } else if has_any_comment(items) {
                    write!(f, "{name} (any comment)")
                } else {
                    let text = comment_texts(items).next().unwrap_or_default().replace('\n', " ");
                    if text.chars().count() > COMMENT_PREVIEW_CHARS {
                        let preview: String = text.chars().take(COMMENT_PREVIEW_CHARS).collect();
                        write!(f, "{name} ({preview}...)")
                    } else {
                        write!(f, "{name} ({text})")
                    }
                }
            }
            Self::Date(window) => {
                if window.is_all_time() {
                    write!(f, "{name} (all time)")
                } else {
                    write!(
                        f,
                        "{name} ({} - {})",
                        window.start().format("%Y-%m-%d %H:%M"),
                        window.end().format("%Y-%m-%d %H:%M")
                    )
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::RecordType;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn ts(minutes: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 15, 9, 0, 0)
            .single()
            .expect("valid test timestamp")
            + Duration::minutes(minutes)
    }

    fn type_id(id: i64) -> RecordTypeId {
        RecordTypeId::new(id).unwrap()
    }

    fn tag(id: i64) -> TagId {
        TagId::new(id).unwrap()
    }

    fn record(id: i64, type_raw: i64, comment: &str) -> Record {
        Record::new(RecordId::new(id).unwrap(), type_id(type_raw), ts(0), ts(30))
            .with_comment(comment)
    }

    fn catalog() -> TypeCatalog {
        TypeCatalog::new([
            RecordType {
                id: type_id(1),
                name: "work".to_string(),
                category_ids: vec![CategoryId::new(10).unwrap()],
            },
            RecordType {
                id: type_id(2),
                name: "gym".to_string(),
                category_ids: vec![CategoryId::new(20).unwrap(), CategoryId::new(10).unwrap()],
            },
            RecordType {
                id: type_id(3),
                name: "nap".to_string(),
                category_ids: vec![],
            },
        ])
    }

    #[test]
    fn no_clauses_match_everything() {
        assert!(matches(&record(1, 3, ""), &[], &catalog()));
    }

    #[test]
    fn clauses_combine_with_and_items_with_or() {
        let filters = [
            RecordsFilter::Activity(vec![type_id(1), type_id(2)]),
            RecordsFilter::Comment(vec![CommentItem::AnyComment]),
        ];
        let catalog = catalog();
        assert!(matches(&record(1, 1, "x"), &filters, &catalog));
        assert!(!matches(&record(2, 3, "x"), &filters, &catalog));
        assert!(!matches(&record(3, 1, ""), &filters, &catalog));
    }

    #[test]
    fn comment_items() {
        let catalog = catalog();
        let none = RecordsFilter::Comment(vec![CommentItem::NoComment]);
        let exact = RecordsFilter::Comment(vec![CommentItem::Text("focus".to_string())]);
        assert!(none.matches(&record(1, 1, ""), &catalog));
        assert!(!none.matches(&record(1, 1, "focus"), &catalog));
        assert!(exact.matches(&record(1, 1, "focus"), &catalog));
        assert!(!exact.matches(&record(1, 1, "focus time"), &catalog));

        let either = RecordsFilter::Comment(vec![
            CommentItem::NoComment,
            CommentItem::Text("focus".to_string()),
        ]);
        assert!(either.matches(&record(1, 1, ""), &catalog));
        assert!(either.matches(&record(1, 1, "focus"), &catalog));
        assert!(!either.matches(&record(1, 1, "other"), &catalog));
    }

    #[test]
    fn category_items() {
        let catalog = catalog();
        let work = RecordsFilter::Category(vec![CategoryItem::Categorized(CategoryId::new(10).unwrap())]);
        assert!(work.matches(&record(1, 1, ""), &catalog));
        assert!(work.matches(&record(1, 2, ""), &catalog));
        assert!(!work.matches(&record(1, 3, ""), &catalog));

        let uncategorized = RecordsFilter::Category(vec![CategoryItem::Uncategorized]);
        assert!(uncategorized.matches(&record(1, 3, ""), &catalog));
        // Unknown types have no categories
        assert!(uncategorized.matches(&record(1, 99, ""), &catalog));
        assert!(!uncategorized.matches(&record(1, 1, ""), &catalog));
    }

    #[test]
    fn selected_and_filtered_tags_have_opposite_polarity() {
        let catalog = catalog();
        let tagged = record(1, 1, "").with_tags([tag(5), tag(6)]);
        let untagged = record(2, 1, "");

        let selected = RecordsFilter::SelectedTags(vec![TagItem::Tagged(tag(5))]);
        assert!(selected.matches(&tagged, &catalog));
        assert!(!selected.matches(&untagged, &catalog));

        let filtered = RecordsFilter::FilteredTags(vec![TagItem::Tagged(tag(5))]);
        assert!(!filtered.matches(&tagged, &catalog));
        assert!(filtered.matches(&untagged, &catalog));

        let select_untagged = RecordsFilter::SelectedTags(vec![TagItem::Untagged]);
        assert!(select_untagged.matches(&untagged, &catalog));
        assert!(!select_untagged.matches(&tagged, &catalog));

        let filter_untagged = RecordsFilter::FilteredTags(vec![TagItem::Untagged]);
        assert!(!filter_untagged.matches(&untagged, &catalog));
        assert!(filter_untagged.matches(&tagged, &catalog));
    }

    #[test]
    fn manually_filtered_respects_polarity() {
        let catalog = catalog();
        let picked = vec![RecordId::new(1).unwrap()];
        let include = RecordsFilter::ManuallyFiltered {
            record_ids: picked.clone(),
            polarity: Polarity::Include,
        };
        let exclude = RecordsFilter::ManuallyFiltered {
            record_ids: picked,
            polarity: Polarity::Exclude,
        };
        let running = crate::record::RunningRecord {
            type_id: type_id(1),
            time_started: ts(0),
            comment: String::new(),
            tag_ids: vec![],
        }
        .materialize(ts(10));

        assert!(include.matches(&record(1, 1, ""), &catalog));
        assert!(!include.matches(&record(2, 1, ""), &catalog));
        assert!(!include.matches(&running, &catalog));

        assert!(!exclude.matches(&record(1, 1, ""), &catalog));
        assert!(exclude.matches(&record(2, 1, ""), &catalog));
        assert!(exclude.matches(&running, &catalog));
    }

    #[test]
    fn date_clause_uses_overlap() {
        let catalog = catalog();
        let inside = RecordsFilter::Date(Window::new(ts(20), ts(60)));
        let after = RecordsFilter::Date(Window::new(ts(30), ts(60)));
        assert!(inside.matches(&record(1, 1, ""), &catalog));
        assert!(!after.matches(&record(1, 1, ""), &catalog));
        assert!(RecordsFilter::Date(Window::ALL_TIME).matches(&record(1, 1, ""), &catalog));
    }

    #[test]
    fn empty_item_lists() {
        let catalog = catalog();
        let r = record(1, 1, "x");
        assert!(!RecordsFilter::Activity(vec![]).matches(&r, &catalog));
        assert!(!RecordsFilter::SelectedTags(vec![]).matches(&r, &catalog));
        assert!(RecordsFilter::FilteredTags(vec![]).matches(&r, &catalog));
    }

    #[test]
    fn apply_all_keeps_matching_records() {
        let records = vec![record(1, 1, "a"), record(2, 2, ""), record(3, 3, "b")];
        let kept = apply_all(
            records,
            &[RecordsFilter::Comment(vec![CommentItem::AnyComment])],
            &catalog(),
        );
        let ids: Vec<i64> = kept.iter().filter_map(|r| r.id).map(RecordId::get).collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[test]
    fn every_kind_is_reachable() {
        // No wildcard arm: adding a clause fails to compile until it is listed.
        fn sample(kind: FilterKind) -> RecordsFilter {
            match kind {
                FilterKind::Activity => RecordsFilter::Activity(vec![]),
                FilterKind::Category => RecordsFilter::Category(vec![]),
                FilterKind::Comment => RecordsFilter::Comment(vec![]),
                FilterKind::Date => RecordsFilter::Date(Window::ALL_TIME),
                FilterKind::SelectedTags => RecordsFilter::SelectedTags(vec![]),
                FilterKind::FilteredTags => RecordsFilter::FilteredTags(vec![]),
                FilterKind::ManuallyFiltered => RecordsFilter::ManuallyFiltered {
                    record_ids: vec![],
                    polarity: Polarity::Exclude,
                },
            }
        }
        for kind in FilterKind::ALL {
            assert_eq!(sample(kind).kind(), kind);
        }
    }

    #[test]
    fn display_summarizes_clause() {
        assert_eq!(
            RecordsFilter::Activity(vec![type_id(1), type_id(2)]).to_string(),
            "activity (2)"
        );
        assert_eq!(
            RecordsFilter::Comment(vec![CommentItem::AnyComment]).to_string(),
            "comment (any comment)"
        );
        assert_eq!(
            RecordsFilter::Comment(vec![CommentItem::Text("deep\nwork session".to_string())])
                .to_string(),
            "comment (deep work ...)"
        );
        assert_eq!(
            RecordsFilter::FilteredTags(vec![TagItem::Untagged]).to_string(),
            "filtered tags (1)"
        );
    }

    #[test]
    fn filter_serde_roundtrip() {
        let filters = vec![
            RecordsFilter::Category(vec![CategoryItem::Uncategorized]),
            RecordsFilter::ManuallyFiltered {
                record_ids: vec![RecordId::new(4).unwrap()],
                polarity: Polarity::Include,
            },
        ];
        let json = serde_json::to_string(&filters).unwrap();
        let parsed: Vec<RecordsFilter> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, filters);
    }
}
