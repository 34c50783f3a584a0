use colored::*;
use lib_realtime::{Operation, UpdateEvent};

/// One console line per update.
pub fn render(event: &UpdateEvent, raw: bool) -> String {
    let ts = chrono::Local::now()
        .format("[%H:%M:%S]")
        .to_string()
        .truecolor(128, 128, 128);
    let op = match event.operation {
        Operation::Insert => "insert".bright_green(),
        Operation::Update => "update".bright_yellow(),
        Operation::Replace => "replace".bright_cyan(),
        Operation::Delete => "delete".bright_red(),
    };

    if raw {
        return format!("{} {} {}", ts, op, event.payload);
    }

    let mut line = format!("{} {} {}", ts, op, event.collection.bold());
    if let Some(id) = &event.document_id {
        line.push_str(&format!(" #{}", id));
    }
    if let Some(fields) = &event.updated_fields {
        let names: Vec<&str> = fields.keys().map(String::as_str).collect();
        line.push_str(&format!(" changed: {}", names.join(", ")));
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_changed_fields() {
        colored::control::set_override(false);
        let event = UpdateEvent::from_value(serde_json::json!({
            "collection": "time_slots",
            "operation": "update",
            "document_id": "665f",
            "document": {"course_id": "CSE101"},
            "updated_fields": {"room_id": "B202"}
        }))
        .unwrap();

        let line = render(&event, false);
        assert!(line.ends_with("update time_slots #665f changed: room_id"), "{line}");
        assert!(render(&event, true).contains(r#""room_id":"B202""#));
    }
}
