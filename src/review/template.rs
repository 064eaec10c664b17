//! The task UI template shown to reviewers.
//!
//! The template is Liquid markup rendered by the review service, not by us.
//! It loops over the rows of a [`ReviewTask`](super::ReviewTask) and names its
//! inputs from the task's answer fields and row IDs.

/// Bundled task UI template.
pub const TASK_UI_TEMPLATE: &str = include_str!("../../templates/review_task.liquid.html");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_loops_over_payload_rows() {
        for needle in [
            "{% for row in task.input.header %}",
            "{% for row in task.input.line_items %}",
            "{% for field in row.fields %}",
            "{% for column in task.input.columns %}",
            "{{ task.input.image_uri | grant_read_access }}",
        ] {
            assert!(TASK_UI_TEMPLATE.contains(needle), "missing {needle}");
        }
    }

    #[test]
    fn test_template_names_inputs_by_row_id() {
        for needle in [
            r#"name="{{ task.input.header_answer_field }}{{ row.row_id }}""#,
            r#"name="{{ task.input.header_comment_field }}{{ row.row_id }}""#,
            r#"name="{{ field.answer_field }}{{ row.row_id }}""#,
            r#"name="{{ task.input.change_comment_field }}{{ row.row_id }}""#,
        ] {
            assert!(TASK_UI_TEMPLATE.contains(needle), "missing {needle}");
        }
    }

    #[test]
    fn test_extracted_text_is_escaped() {
        for needle in [
            r#"<td>{{ row.text | escape }}</td>"#,
            r#"value="{{ row.text | escape }}""#,
            r#"<th>{{ column.name | escape }}</th>"#,
            r#"<p class="original">{{ field.original | escape }}</p>"#,
            r#"value="{{ field.original | escape }}""#,
        ] {
            assert!(TASK_UI_TEMPLATE.contains(needle), "missing {needle}");
        }
        for raw in ["{{ row.text }}", "{{ field.original }}", "{{ column.name }}"] {
            assert!(!TASK_UI_TEMPLATE.contains(raw), "unescaped {raw}");
        }
    }

    #[test]
    fn test_template_balanced_loops() {
        let opens = TASK_UI_TEMPLATE.matches("{% for ").count();
        let closes = TASK_UI_TEMPLATE.matches("{% endfor %}").count();
        assert_eq!(opens, closes);
    }
}
