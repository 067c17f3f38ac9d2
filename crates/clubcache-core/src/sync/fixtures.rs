//! Builders for raw page-database records used across sync tests.

use serde_json::{json, Value};

use crate::models::RawRecord;

pub fn title(text: &str) -> Value {
    json!({"type": "title", "title": [{"plain_text": text}]})
}

pub fn rich_text(text: &str) -> Value {
    json!({"type": "rich_text", "rich_text": [{"plain_text": text}]})
}

pub fn empty_rich_text() -> Value {
    json!({"type": "rich_text", "rich_text": []})
}

pub fn select(name: Option<&str>) -> Value {
    json!({"type": "select", "select": name.map(|n| json!({"name": n}))})
}

pub fn url(link: Option<&str>) -> Value {
    json!({"type": "url", "url": link})
}

pub fn relation(ids: &[&str]) -> Value {
    let refs: Vec<Value> = ids.iter().map(|id| json!({"id": id})).collect();
    json!({"type": "relation", "relation": refs})
}

pub fn date(start: Option<&str>, end: Option<&str>) -> Value {
    match start {
        Some(start) => json!({"type": "date", "date": {"start": start, "end": end}}),
        None => json!({"type": "date", "date": null}),
    }
}

pub fn files(name: Option<&str>) -> Value {
    let list: Vec<Value> = name
        .map(|n| {
            json!({
                "name": n,
                "type": "file",
                "file": {"url": format!("https://files.example.org/{}", n)}
            })
        })
        .into_iter()
        .collect();
    json!({"type": "files", "files": list})
}

pub fn record(id: &str, edited: &str, properties: Value) -> RawRecord {
    serde_json::from_value(json!({
        "id": id,
        "last_edited_time": edited,
        "archived": false,
        "in_trash": false,
        "properties": properties,
    }))
    .unwrap()
}

pub fn role(id: &str, name: &str) -> RawRecord {
    record(id, "2024-01-01T00:00:00.000Z", json!({"Name": title(name)}))
}

pub fn executive(id: &str, edited: &str, name: &str, role_ids: &[&str], picture: Option<&str>) -> RawRecord {
    record(
        id,
        edited,
        json!({
            "Name": title(name),
            "Pronouns": rich_text("they/them"),
            "Bio": empty_rich_text(),
            "Role": relation(role_ids),
            "Prior Roles": relation(&[]),
            "Term Start": select(Some("Fall 2023")),
            "Last Term": select(None),
            "Status": select(Some("Active")),
            "Candid": files(picture),
            "LinkedIn": url(Some("https://linkedin.com/in/someone")),
            "GitHub": url(None),
        }),
    )
}

pub fn event(id: &str, edited: &str, name: &str, start: Option<&str>, thumbnail: Option<&str>) -> RawRecord {
    record(
        id,
        edited,
        json!({
            "Title": title(name),
            "Event Date": date(start, None),
            "Location": rich_text("A-Building"),
            "Thumbnail": files(thumbnail),
            "Registration Link": url(None),
        }),
    )
}
