//! Plain-text output for the terminal.

use std::fmt::Write as _;

use mindjourney_core::{
  category::Category,
  entry::Entry,
  face::{Face, FaceSuggestion},
};

pub fn entry_line(entry: &Entry) -> String {
  let status = match entry.sentiment() {
    Some(s) => format!("{s:+.2}"),
    None if entry.insights_processed => "  -  ".to_owned(),
    None => "  …  ".to_owned(),
  };
  let visibility = if entry.is_public { "public " } else { "private" };
  format!(
    "{:>5}  {}  {status}  {visibility}  {}",
    entry.id,
    entry.created_at.format("%Y-%m-%d"),
    entry.display_title()
  )
}

pub fn entry_list(entries: &[Entry]) -> String {
  if entries.is_empty() {
    return "no entries\n".to_owned();
  }
  entries.iter().map(|e| entry_line(e) + "\n").collect()
}

pub fn entry_detail(entry: &Entry) -> String {
  let mut out = String::new();
  let _ = writeln!(out, "#{} {}", entry.id, entry.display_title());
  let _ = writeln!(out, "created   {}", entry.created_at.to_rfc3339());
  if let Some(updated) = entry.updated_at {
    let _ = writeln!(out, "updated   {}", updated.to_rfc3339());
  }
  let _ = writeln!(out, "visible   {}", if entry.is_public { "public" } else { "private" });
  if !entry.faces.is_empty() {
    let faces: Vec<_> = entry.faces.iter().map(|f| format!("{} {}", f.icon, f.name)).collect();
    let _ = writeln!(out, "faces     {}", faces.join(", "));
  }
  if let Some(place) = &entry.location_name {
    let _ = writeln!(out, "location  {place}");
  }
  let _ = writeln!(out, "\n{}\n", entry.content.trim_end());

  match entry.processed_insights() {
    None => {
      let _ = writeln!(out, "insights  processing…");
    }
    Some(insights) => {
      if let Some(s) = entry.sentiment() {
        let _ = writeln!(out, "sentiment {s:+.2}");
      }
      for insight in insights {
        let _ = writeln!(
          out,
          "  [{}] {:<20} {:+.2}  ({:.0}% sure)",
          insight.category.category_type,
          insight.text_snippet,
          insight.sentiment_score,
          insight.confidence_score * 100.0
        );
      }
    }
  }
  for doc in &entry.documents {
    let _ = writeln!(out, "  📎 {} ({} bytes, id {})", doc.filename, doc.file_size, doc.id);
  }
  out
}

pub fn face_list(faces: &[Face]) -> String {
  if faces.is_empty() {
    return "no faces\n".to_owned();
  }
  faces.iter().map(|f| format!("{:>5}  {} {}\n", f.id, f.icon, f.name)).collect()
}

pub fn category_list(categories: &[Category]) -> String {
  if categories.is_empty() {
    return "no categories\n".to_owned();
  }
  categories
    .iter()
    .map(|c| format!("{:>5}  {:<9} {}\n", c.id, c.category_type, c.name))
    .collect()
}

pub fn suggestion_list(suggestions: &[FaceSuggestion]) -> String {
  if suggestions.is_empty() {
    return "no suggestions\n".to_owned();
  }
  suggestions
    .iter()
    .map(|s| match s.id {
      Some(id) => format!("{:>5}  {} {}\n", id, s.icon, s.name),
      None => format!("  new  {} {}\n", s.icon, s.name),
    })
    .collect()
}

#[cfg(test)]
mod tests {
  use chrono::{TimeZone, Utc};
  use mindjourney_core::id::{EntryId, FaceId};

  use super::*;

  fn entry() -> Entry {
    Entry {
      id:                 EntryId(12),
      user:               None,
      title:              Some("Prague".into()),
      content:            "Visited Prague today".into(),
      is_public:          true,
      created_at:         Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap(),
      updated_at:         None,
      insights_processed: false,
      overall_sentiment:  Some(0.5),
      faces:              vec![],
      insights:           vec![],
      documents:          vec![],
      location_name:      None,
      latitude:           None,
      longitude:          None,
    }
  }

  #[test]
  fn unprocessed_entries_hide_sentiment() {
    let line = entry_line(&entry());
    assert!(line.contains("2026-03-01"));
    assert!(line.contains('…'));
    assert!(!line.contains("+0.50"));
    assert!(entry_detail(&entry()).contains("processing…"));
  }

  #[test]
  fn processed_entries_show_sentiment() {
    let processed = Entry { insights_processed: true, ..entry() };
    assert!(entry_line(&processed).contains("+0.50"));
  }

  #[test]
  fn proposals_are_marked_new() {
    let out = suggestion_list(&[
      FaceSuggestion { name: "Father".into(), icon: "👨".into(), id: Some(FaceId(3)) },
      FaceSuggestion { name: "Traveler".into(), icon: "🧳".into(), id: None },
    ]);
    assert!(out.contains("    3  👨 Father"));
    assert!(out.contains("  new  🧳 Traveler"));
  }
}
