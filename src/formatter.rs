use crate::detection::DetectionResult;

/// Render a detection result as the text sent back to the user.
/// Total: every result, including `Malformed`, yields a reply.
pub fn format_result(result: &DetectionResult) -> String {
    match result {
        DetectionResult::StructuredLabels(labels) if labels.is_empty() => {
            "No objects detected.".to_string()
        }
        DetectionResult::StructuredLabels(labels) => {
            let names: Vec<&str> = labels.iter().map(|l| l.class_name.as_str()).collect();
            format!("Detected objects: {}", names.join(", "))
        }
        DetectionResult::RawKeyValue(entries) => {
            let mut text = String::from("Prediction result:");
            for (key, value) in entries {
                text.push_str(&format!("\n{}: {}", key, value));
            }
            text
        }
        DetectionResult::Malformed => "Invalid prediction result format.".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::{parse_response, DetectionLabel, ParseStrategy};

    fn label(name: &str) -> DetectionLabel {
        DetectionLabel {
            class_name: name.to_string(),
            center_x: 0.0,
            center_y: 0.0,
            width: 0.0,
            height: 0.0,
        }
    }

    fn format_body(body: &str) -> String {
        let parsed = parse_response(body, &[ParseStrategy::PseudoJson, ParseStrategy::KeyValue]);
        format_result(&parsed.result)
    }

    #[test]
    fn test_no_labels() {
        let out = format_result(&DetectionResult::StructuredLabels(vec![]));
        assert_eq!(out, "No objects detected.");
    }

    #[test]
    fn test_labels_keep_order_and_duplicates() {
        let out = format_result(&DetectionResult::StructuredLabels(vec![
            label("person"),
            label("dog"),
            label("person"),
        ]));
        assert_eq!(out, "Detected objects: person, dog, person");
    }

    #[test]
    fn test_key_value_lines() {
        let out = format_result(&DetectionResult::RawKeyValue(vec![
            ("zeta".to_string(), "1".to_string()),
            ("alpha".to_string(), "two words".to_string()),
        ]));
        assert_eq!(out, "Prediction result:\nzeta: 1\nalpha: two words");
    }

    #[test]
    fn test_malformed() {
        assert_eq!(
            format_result(&DetectionResult::Malformed),
            "Invalid prediction result format."
        );
    }

    #[test]
    fn test_from_raw_bodies() {
        assert_eq!(
            format_body("{'labels': [{'class': 'cat'}, {'class': 'bowl'}]}"),
            "Detected objects: cat, bowl"
        );
        assert_eq!(format_body(r#"{"labels": []}"#), "No objects detected.");
        assert_eq!(
            format_body("model: yolov5s\nobjects: 0"),
            "Prediction result:\nmodel: yolov5s\nobjects: 0"
        );
        assert_eq!(format_body(""), "Invalid prediction result format.");
        assert_eq!(format_body("{'labels': ["), "Invalid prediction result format.");
    }
}
