use crate::{
    presenter::{format_percentage, PredictionView},
    routes::MAIN_SCRIPT_PATH,
    validation::ALLOWED_EXTENSIONS,
};
use axum::response::Html;
use std::fmt::Write;

const STYLE: &str = r#"
body { font-family: system-ui, sans-serif; margin: 0; background: #f4f6f8; color: #1d2733; }
main { max-width: 760px; margin: 2rem auto; padding: 0 1rem; }
.card { background: #fff; border-radius: 12px; padding: 1.5rem; box-shadow: 0 2px 10px rgba(0,0,0,.06); margin-bottom: 1.5rem; }
.notice { background: #fff4e5; border-left: 4px solid #f29d38; padding: .75rem 1rem; border-radius: 6px; }
.verdict.diseased { color: #b42318; }
.verdict.healthy { color: #067647; }
.preview { max-width: 100%; max-height: 320px; border-radius: 8px; display: block; margin-bottom: 1rem; }
ol.ranking { padding-left: 1.25rem; }
ol.ranking li { margin: .4rem 0; }
.bar { height: 6px; background: #d0d5dd; border-radius: 3px; }
.bar span { display: block; height: 100%; background: #2e90fa; border-radius: 3px; }
footer { font-size: .85rem; color: #667085; }
.dropzone { display: block; border: 2px dashed #d0d5dd; border-radius: 10px; padding: 1rem; margin-bottom: 1rem; transition: transform .15s; }
.dropzone.dragging { transform: translateY(-6px) scale(1.01); border-color: #2e90fa; }
.dropzone.has-file .placeholder { display: none; }
.dropzone img { max-width: 100%; max-height: 240px; border-radius: 8px; }
"#;

pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn upload_form() -> String {
    let accept = ALLOWED_EXTENSIONS
        .iter()
        .map(|ext| format!(".{}", ext))
        .collect::<Vec<_>>()
        .join(",");

    format!(
        r#"<section class="card">
<h1>Skin lesion analysis</h1>
<form method="post" action="/" enctype="multipart/form-data">
<label id="dropzone" class="dropzone">
<span class="placeholder">Drop an image here or choose a file</span>
<input id="image-input" type="file" name="image" accept="{accept}">
<img id="upload-preview" alt="Selected image" hidden>
</label>
<button type="submit">Analyze</button>
<a id="clear" href="/">Clear</a>
</form>
</section>"#
    )
}

fn layout(body: &str, model_id: &str) -> Html<String> {
    Html(format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>Skin lesion analysis</title>
<style>{STYLE}</style>
<script src="{MAIN_SCRIPT_PATH}" defer></script>
</head>
<body>
<main>
{body}
<footer>Model: {model}. Predictions are not a medical diagnosis.</footer>
</main>
</body>
</html>"#,
        model = escape_html(model_id),
    ))
}

/// Upload form, with an optional message from a rejected upload.
pub fn render_form(notice: Option<&str>, model_id: &str) -> Html<String> {
    let mut body = String::new();
    if let Some(message) = notice {
        let _ = write!(
            body,
            r#"<p class="notice" role="alert">{}</p>"#,
            escape_html(message)
        );
    }
    body.push_str(&upload_form());
    layout(&body, model_id)
}

pub fn render_prediction(view: &PredictionView) -> Html<String> {
    let mut ranking = String::new();
    for entry in &view.results {
        let percentage = format_percentage(entry.probability);
        let _ = write!(
            ranking,
            r#"<li><span>{label}</span> <strong>{percentage}</strong><div class="bar"><span style="width: {percentage}"></span></div></li>"#,
            label = escape_html(&entry.label),
        );
    }

    let (verdict_class, verdict) = if view.is_diseased {
        ("diseased", "Possible skin condition detected")
    } else {
        ("healthy", "No skin condition detected")
    };

    let result = format!(
        r#"<section class="card">
<img class="preview" src="{image}" alt="Uploaded image">
<h2 class="verdict {verdict_class}">{verdict}</h2>
<p>Prediction: <strong class="prediction">{prediction}</strong> ({probability})</p>
<h3>Top predictions</h3>
<ol class="ranking">{ranking}</ol>
</section>"#,
        image = escape_html(&view.uploaded_image),
        prediction = escape_html(&view.prediction),
        probability = format_percentage(view.probability),
    );

    let body = format!("{}{}", upload_form(), result);
    layout(&body, &view.model_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lesion_prediction::LabelProbability;

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html(r#"<img src="x" onerror='a&b'>"#),
            "&lt;img src=&quot;x&quot; onerror=&#39;a&amp;b&#39;&gt;"
        );
    }

    #[test]
    fn test_form_shows_notice() {
        let Html(page) = render_form(Some("No selected file"), "acme/model");

        assert!(page.contains(r#"<p class="notice" role="alert">No selected file</p>"#));
        assert!(page.contains(r#"name="image""#));
        assert!(page.contains(r#"accept=".png,.jpg,.jpeg""#));
        assert!(page.contains("acme/model"));
        assert!(page.contains(r#"<script src="/static/main.js" defer></script>"#));
        assert!(page.contains(r#"id="dropzone""#));
    }

    #[test]
    fn test_form_without_notice() {
        let Html(page) = render_form(None, "acme/model");

        assert!(!page.contains("class=\"notice\""));
    }

    #[test]
    fn test_prediction_page() {
        let view = PredictionView {
            prediction: "Melanoma <b>".to_string(),
            probability: 0.8,
            results: vec![
                LabelProbability::new("Melanoma <b>", 0.8),
                LabelProbability::new("Normal", 0.2),
            ],
            is_diseased: true,
            model_id: "acme/model".to_string(),
            uploaded_image: "/static/uploads/lesion.jpg".to_string(),
        };

        let Html(page) = render_prediction(&view);

        assert!(page.contains(r#"src="/static/uploads/lesion.jpg""#));
        assert!(page.contains("Melanoma &lt;b&gt;"));
        assert!(!page.contains("Melanoma <b>"));
        assert!(page.contains("80.00%"));
        assert!(page.contains("20.00%"));
        assert!(page.contains("verdict diseased"));
        assert_eq!(page.matches("<li>").count(), 2);
    }
}
