//! Version-control table date maintenance.
//!
//! Compliance templates carry a history table ("Drafted", "Reviewed",
//! "Amendment", ...) whose dates go stale between releases. This pass
//! finds the first such table, rewrites recent dates to the reference
//! date and future review dates to one year past it, and tightens the
//! layout so the heading stays glued to its table. Dates older than
//! five years are history and stay untouched.

use crate::docx::{
    cell_text, content_root, make_text_run, paragraph_text, set_keep_with_next,
    set_paragraph_spacing, top_level_tables,
};
use crate::xml::{NodeId, XmlTree};
use chrono::{Datelike, Duration, NaiveDate};
use regex::Regex;

/// A table is a version-control table when its text mentions any of
/// these.
const VERSION_KEYWORDS: [&str; 4] = ["drafted", "version control", "reviewed", "amendment"];

/// How far back a date still counts as current rather than historical.
const CURRENT_WINDOW_YEARS: i32 = 5;

/// What the version-control stage did to one document.
#[derive(Debug, Default, Clone, Copy)]
pub struct VersionControlOutcome {
    /// A version-control table was found and handled.
    pub processed: bool,
    /// Any cell or layout property changed.
    pub changed: bool,
}

/// Rewrites version-control dates against a fixed reference date.
pub struct VersionControlUpdater {
    ordinal: Regex,
    month_year: Regex,
    year: Regex,
    reference: NaiveDate,
}

impl VersionControlUpdater {
    /// Build an updater for the given reference date.
    pub fn new(reference: NaiveDate) -> Self {
        VersionControlUpdater {
            ordinal: Regex::new(r"(?i)\d{1,2}(?:st|nd|rd|th)\s+of\s+[A-Za-z]+\s+\d{4}").unwrap(),
            month_year: Regex::new(r"(?i)[A-Za-z]+\s+\d{4}").unwrap(),
            year: Regex::new(r"\b\d{4}\b").unwrap(),
            reference,
        }
    }

    /// Rewrite dates in the first version-control table and tighten the
    /// heading layout.
    pub fn apply(&self, tree: &mut XmlTree) -> VersionControlOutcome {
        let mut outcome = VersionControlOutcome::default();
        if let Some(table) = find_version_table(tree) {
            outcome.processed = true;
            for cell in tree.descendants_named(table, "w:tc") {
                if self.rewrite_cell_dates(tree, cell) {
                    outcome.changed = true;
                }
            }
        }
        if apply_heading_layout(tree) {
            outcome.changed = true;
        }
        outcome
    }

    /// Rewrite the dates of one cell, keeping the first run's character
    /// formatting. Returns whether the cell content changed.
    fn rewrite_cell_dates(&self, tree: &mut XmlTree, cell: NodeId) -> bool {
        let original = cell_text(tree, cell);
        let Some(pattern) = self.first_matching(&original) else {
            return false;
        };
        let updated = pattern
            .replace_all(&original, |caps: &regex::Captures| {
                self.rewrite_date(&caps[0])
            })
            .into_owned();
        if updated == original {
            return false;
        }

        let first_run = tree.descendants_named(cell, "w:r").into_iter().next();
        let props = first_run.and_then(|run| tree.find_child(run, "w:rPr"));
        let run_props = props.map(|p| tree.clone_subtree(p));

        for child in tree.children(cell).to_vec() {
            if tree.name(child) != "w:tcPr" {
                tree.detach(child);
            }
        }
        let paragraph = tree.create_element("w:p");
        tree.append_child(cell, paragraph);
        let run = make_text_run(tree, run_props, &updated);
        tree.append_child(paragraph, run);
        true
    }

    /// The highest-priority date pattern present in a text, if any.
    /// Ordinal dates win over month-year, month-year over bare years,
    /// so mixed cells are rewritten at their most specific granularity.
    fn first_matching(&self, text: &str) -> Option<&Regex> {
        [&self.ordinal, &self.month_year, &self.year]
            .into_iter()
            .find(|re| re.is_match(text))
    }

    /// Map one matched date onto the reference timeline. The trailing
    /// year decides: future years become the next-review date, years
    /// within the current window become the reference date, anything
    /// older is preserved as history.
    fn rewrite_date(&self, matched: &str) -> String {
        let Some(year_match) = self.year.find_iter(matched).last() else {
            return matched.to_string();
        };
        let Ok(year) = year_match.as_str().parse::<i32>() else {
            return matched.to_string();
        };
        let current = self.reference.year();
        if year > current {
            ordinal_date(next_review_date(self.reference))
        } else if year >= current - CURRENT_WINDOW_YEARS {
            ordinal_date(self.reference)
        } else {
            matched.to_string()
        }
    }
}

/// First top-level table whose text carries a version-control keyword.
fn find_version_table(tree: &XmlTree) -> Option<NodeId> {
    top_level_tables(tree).into_iter().find(|&table| {
        let text = tree.text_content(table).to_lowercase();
        VERSION_KEYWORDS.iter().any(|k| text.contains(k))
    })
}

/// `14th of August 2025` style.
fn ordinal_date(date: NaiveDate) -> String {
    let day = date.day();
    let suffix = if (10..=20).contains(&day) {
        "th"
    } else {
        match day % 10 {
            1 => "st",
            2 => "nd",
            3 => "rd",
            _ => "th",
        }
    };
    format!("{day}{suffix} of {} {}", date.format("%B"), date.year())
}

/// One year past the reference; falls back over leap-day gaps.
fn next_review_date(reference: NaiveDate) -> NaiveDate {
    reference
        .with_year(reference.year() + 1)
        .unwrap_or_else(|| reference + Duration::days(365))
}

/// Glue the "Version Control Table" heading to the table that follows:
/// drop blank paragraphs around the heading, keep it with the next
/// block, and keep the table's first row with its own successors.
fn apply_heading_layout(tree: &mut XmlTree) -> bool {
    let body = content_root(tree);
    let heading = tree.children(body).iter().copied().find(|&child| {
        if tree.name(child) != "w:p" {
            return false;
        }
        let text = paragraph_text(tree, child).to_lowercase();
        text.contains("version control") && text.contains("table")
    });
    let Some(heading) = heading else {
        return false;
    };

    loop {
        let Some(index) = tree.position_in_parent(heading) else {
            break;
        };
        if index == 0 {
            break;
        }
        let prev = tree.children(body)[index - 1];
        if tree.name(prev) == "w:p" && paragraph_text(tree, prev).trim().is_empty() {
            tree.detach(prev);
        } else {
            break;
        }
    }
    loop {
        let Some(index) = tree.position_in_parent(heading) else {
            break;
        };
        let siblings = tree.children(body);
        if index + 1 >= siblings.len() {
            break;
        }
        let next = siblings[index + 1];
        if tree.name(next) == "w:p" && paragraph_text(tree, next).trim().is_empty() {
            tree.detach(next);
        } else {
            break;
        }
    }

    set_keep_with_next(tree, heading);
    set_paragraph_spacing(tree, heading, 0, 120);

    if let Some(index) = tree.position_in_parent(heading) {
        let table = tree.children(body)[index + 1..]
            .iter()
            .copied()
            .find(|&n| tree.name(n) == "w:tbl");
        if let Some(table) = table {
            if let Some(first_row) = tree.find_child(table, "w:tr") {
                for cell in tree.children(first_row).to_vec() {
                    if tree.name(cell) != "w:tc" {
                        continue;
                    }
                    if let Some(paragraph) = tree.find_descendant(cell, "w:p") {
                        set_keep_with_next(tree, paragraph);
                    }
                }
            }
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 8, 14).unwrap()
    }

    fn table_doc(cells: &[&str]) -> XmlTree {
        let mut xml = String::from("<w:body><w:tbl><w:tr>");
        for cell in cells {
            xml.push_str("<w:tc><w:p><w:r><w:t>");
            xml.push_str(cell);
            xml.push_str("</w:t></w:r></w:p></w:tc>");
        }
        xml.push_str("</w:tr></w:tbl></w:body>");
        XmlTree::parse_str(&xml).unwrap()
    }

    fn cell_texts(tree: &XmlTree) -> Vec<String> {
        tree.descendants_named(tree.root(), "w:tc")
            .iter()
            .map(|&c| cell_text(tree, c))
            .collect()
    }

    #[test]
    fn test_ordinal_date_suffixes() {
        let date = |d| NaiveDate::from_ymd_opt(2025, 8, d).unwrap();
        assert_eq!(ordinal_date(date(1)), "1st of August 2025");
        assert_eq!(ordinal_date(date(2)), "2nd of August 2025");
        assert_eq!(ordinal_date(date(3)), "3rd of August 2025");
        assert_eq!(ordinal_date(date(4)), "4th of August 2025");
        assert_eq!(ordinal_date(date(11)), "11th of August 2025");
        assert_eq!(ordinal_date(date(12)), "12th of August 2025");
        assert_eq!(ordinal_date(date(13)), "13th of August 2025");
        assert_eq!(ordinal_date(date(21)), "21st of August 2025");
        assert_eq!(ordinal_date(date(22)), "22nd of August 2025");
        assert_eq!(ordinal_date(date(23)), "23rd of August 2025");
        assert_eq!(ordinal_date(date(31)), "31st of August 2025");
    }

    #[test]
    fn test_next_review_date() {
        assert_eq!(
            next_review_date(reference()),
            NaiveDate::from_ymd_opt(2026, 8, 14).unwrap()
        );
        // Leap day has no direct successor a year on.
        assert_eq!(
            next_review_date(NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()),
            NaiveDate::from_ymd_opt(2025, 2, 28).unwrap()
        );
    }

    #[test]
    fn test_recent_dates_become_reference() {
        let mut tree = table_doc(&["Drafted", "August 2020", "Reviewed", "2024"]);
        let outcome = VersionControlUpdater::new(reference()).apply(&mut tree);
        assert!(outcome.processed);
        assert!(outcome.changed);
        let cells = cell_texts(&tree);
        assert_eq!(cells[1], "14th of August 2025");
        assert_eq!(cells[3], "14th of August 2025");
    }

    #[test]
    fn test_future_date_becomes_next_review() {
        let mut tree = table_doc(&["Reviewed", "Next review August 2026"]);
        VersionControlUpdater::new(reference()).apply(&mut tree);
        assert_eq!(cell_texts(&tree)[1], "Next review 14th of August 2026");
    }

    #[test]
    fn test_historical_date_untouched() {
        let mut tree = table_doc(&["Drafted", "January 2010"]);
        let outcome = VersionControlUpdater::new(reference()).apply(&mut tree);
        assert!(outcome.processed);
        assert_eq!(cell_texts(&tree)[1], "January 2010");
    }

    #[test]
    fn test_ordinal_pattern_wins_in_mixed_cell() {
        let mut tree = table_doc(&["Drafted", "1st of March 2023 then August 2019"]);
        VersionControlUpdater::new(reference()).apply(&mut tree);
        // Only the ordinal granularity is rewritten.
        assert_eq!(
            cell_texts(&tree)[1],
            "14th of August 2025 then August 2019"
        );
    }

    #[test]
    fn test_table_without_keywords_skipped() {
        let mut tree = table_doc(&["Name", "August 2020"]);
        let outcome = VersionControlUpdater::new(reference()).apply(&mut tree);
        assert!(!outcome.processed);
        assert!(!outcome.changed);
        assert_eq!(cell_texts(&tree)[1], "August 2020");
    }

    #[test]
    fn test_first_run_formatting_preserved() {
        let mut tree = XmlTree::parse_str(
            "<w:body><w:tbl><w:tr><w:tc><w:tcPr><w:shd/></w:tcPr>\
             <w:p><w:r><w:rPr><w:b/></w:rPr><w:t>Reviewed August 2024</w:t></w:r></w:p>\
             </w:tc></w:tr></w:tbl></w:body>",
        )
        .unwrap();
        VersionControlUpdater::new(reference()).apply(&mut tree);
        let cell = tree.descendants_named(tree.root(), "w:tc")[0];
        let serialized = tree.serialize_node(cell).unwrap();
        assert!(serialized.contains("<w:tcPr><w:shd/></w:tcPr>"));
        assert!(serialized.contains("<w:rPr><w:b/></w:rPr>"));
        assert!(serialized.contains("Reviewed 14th of August 2025"));
    }

    #[test]
    fn test_multiline_cell_keeps_breaks() {
        let mut tree = XmlTree::parse_str(
            "<w:body><w:tbl><w:tr><w:tc>\
             <w:p><w:r><w:t>Drafted August 2024</w:t></w:r></w:p>\
             <w:p><w:r><w:t>Reviewed 2025</w:t></w:r></w:p>\
             </w:tc></w:tr></w:tbl></w:body>",
        )
        .unwrap();
        VersionControlUpdater::new(reference()).apply(&mut tree);
        let cell = tree.descendants_named(tree.root(), "w:tc")[0];
        let serialized = tree.serialize_node(cell).unwrap();
        // Month-year is the winning granularity for this cell, so the
        // bare trailing year on the second line is left alone. The
        // paragraph boundary comes back as a line break.
        assert!(serialized.contains("Drafted 14th of August 2025"));
        assert!(serialized.contains("Reviewed 2025"));
        assert!(serialized.contains("<w:br/>"));
    }

    #[test]
    fn test_heading_layout_tightened() {
        let mut tree = XmlTree::parse_str(
            "<w:body>\
             <w:p><w:r><w:t>intro</w:t></w:r></w:p>\
             <w:p><w:r><w:t> </w:t></w:r></w:p>\
             <w:p><w:r><w:t>Version Control Table</w:t></w:r></w:p>\
             <w:p/>\
             <w:tbl><w:tr><w:tc><w:p><w:r><w:t>Drafted</w:t></w:r></w:p></w:tc></w:tr></w:tbl>\
             </w:body>",
        )
        .unwrap();
        let outcome = VersionControlUpdater::new(reference()).apply(&mut tree);
        assert!(outcome.changed);

        let body = content_root(&tree);
        let names: Vec<&str> = tree
            .children(body)
            .iter()
            .map(|&c| tree.name(c))
            .collect();
        assert_eq!(names, vec!["w:p", "w:p", "w:tbl"]);

        let heading = tree.children(body)[1];
        let serialized = tree.serialize_node(heading).unwrap();
        assert!(serialized.contains("<w:keepNext/>"));
        assert!(serialized.contains("w:after=\"120\""));

        let row_paragraph = tree
            .find_descendant(tree.children(body)[2], "w:p")
            .unwrap();
        assert!(tree
            .serialize_node(row_paragraph)
            .unwrap()
            .contains("<w:keepNext/>"));
    }

    #[test]
    fn test_nested_table_not_selected() {
        let mut tree = XmlTree::parse_str(
            "<w:body><w:tbl><w:tr><w:tc>\
             <w:tbl><w:tr><w:tc><w:p><w:r><w:t>Drafted August 2024</w:t></w:r></w:p></w:tc></w:tr></w:tbl>\
             <w:p/>\
             </w:tc></w:tr></w:tbl></w:body>",
        )
        .unwrap();
        // The outer table's text includes the nested keyword text, so
        // the outer table is the one selected and rewritten.
        let outcome = VersionControlUpdater::new(reference()).apply(&mut tree);
        assert!(outcome.processed);
        assert!(tree
            .serialize_node(tree.root())
            .unwrap()
            .contains("14th of August 2025"));
    }
}
