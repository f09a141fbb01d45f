//! Run discovery from NOMADS directory listings.

use tile_common::RunId;

/// Every run of digits of length `digits` that sits between `prefix` and
/// `suffix` in `text`.
fn captures<'a>(text: &'a str, prefix: &str, digits: usize, suffix: &str) -> Vec<&'a str> {
    let mut found = Vec::new();
    let mut rest = text;
    while let Some(at) = rest.find(prefix) {
        let after = &rest[at + prefix.len()..];
        let candidate = after.get(..digits);
        if let Some(candidate) = candidate {
            if candidate.bytes().all(|b| b.is_ascii_digit())
                && after[digits..].starts_with(suffix)
            {
                found.push(candidate);
            }
        }
        rest = after;
    }
    found
}

fn parse_date(digits: &str) -> Option<(i32, u32, u32)> {
    let year = digits.get(0..4)?.parse().ok()?;
    let month = digits.get(4..6)?.parse().ok()?;
    let day = digits.get(6..8)?.parse().ok()?;
    Some((year, month, day))
}

fn sorted_unique(mut runs: Vec<RunId>) -> Vec<RunId> {
    runs.retain(|run| run.to_datetime().is_some());
    runs.sort();
    runs.dedup();
    runs
}

/// Runs from the GFS root listing (`"gfs.YYYYMMDDCC/"` entries), oldest first.
pub fn parse_gfs_runs(html: &str) -> Vec<RunId> {
    let runs = captures(html, "\"gfs.", 10, "/\"")
        .into_iter()
        .filter_map(|digits| {
            let (year, month, day) = parse_date(digits)?;
            let cycle = digits.get(8..10)?.parse().ok()?;
            Some(RunId::new(year, month, day, cycle))
        })
        .collect();
    sorted_unique(runs)
}

/// Days from the HRRR root listing (`"hrrr.YYYYMMDD/"` entries), oldest first.
pub fn parse_hrrr_days(html: &str) -> Vec<(i32, u32, u32)> {
    let mut days: Vec<_> = captures(html, "\"hrrr.", 8, "/\"")
        .into_iter()
        .filter_map(parse_date)
        .collect();
    days.sort();
    days.dedup();
    days
}

/// Runs from one HRRR day listing (`hrrr.tCCz` file names), oldest first.
pub fn parse_hrrr_runs(html: &str, day: (i32, u32, u32)) -> Vec<RunId> {
    let runs = captures(html, "\"hrrr.t", 2, "z")
        .into_iter()
        .filter_map(|digits| digits.parse().ok())
        .map(|cycle| RunId::new(day.0, day.1, day.2, cycle))
        .collect();
    sorted_unique(runs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_captures_requires_delimiters() {
        let text = r#""gfs.2024031412/" "gfs.20240314/" gfs.2024031406/ "gfs.2024031400/x""#;
        assert_eq!(captures(text, "\"gfs.", 10, "/\""), vec!["2024031412"]);
    }

    #[test]
    fn test_invalid_dates_are_dropped() {
        let html = r#"<a href="gfs.2024023112/"></a><a href="gfs.2024031425/"></a>"#;
        assert!(parse_gfs_runs(html).is_empty());
    }

    #[test]
    fn test_duplicates_collapse() {
        let html = r#"<a href="gfs.2024031412/">x</a><a href="gfs.2024031412/">y</a>"#;
        assert_eq!(parse_gfs_runs(html), vec![RunId::new(2024, 3, 14, 12)]);
    }
}
