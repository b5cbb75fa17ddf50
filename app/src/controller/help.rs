use quoteclip_core::Publication;
use rust_embed::RustEmbed;

#[derive(RustEmbed)]
#[folder = "docs/"]
#[include = "*.md"]
struct HelpDocs;

/// Rendered from the dialog store rather than a file.
pub const PUBLICATIONS_TOPIC: &str = "publications";

/// Every topic the help command accepts, sorted.
pub fn topics() -> Vec<String> {
    let mut topics = HelpDocs::iter()
        .filter_map(|path| path.strip_suffix(".md").map(str::to_owned))
        .collect::<Vec<_>>();
    topics.push(PUBLICATIONS_TOPIC.to_owned());
    topics.sort();
    topics
}

pub fn topic_text(topic: &str) -> Option<String> {
    let file = HelpDocs::get(&format!("{}.md", topic.trim().to_ascii_lowercase()))?;
    Some(String::from_utf8_lossy(&file.data).into_owned())
}

pub fn render_publications(publications: &[Publication]) -> String {
    if publications.is_empty() {
        return "Nothing has been ingested yet.".to_owned();
    }
    let mut out = String::from("**publications**\n");
    for p in publications {
        let series = p
            .series
            .iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        out.push_str(&format!("- `~{}` series {}\n", p.name, series));
    }
    out
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn embedded_topics() {
        let topics = topics();
        assert!(topics.contains(&"search".to_owned()));
        assert!(topics.contains(&PUBLICATIONS_TOPIC.to_owned()));
        let mut sorted = topics.clone();
        sorted.sort();
        assert_eq!(topics, sorted);
    }

    #[test]
    fn topic_lookup() {
        assert!(topic_text("search").unwrap().contains("/search"));
        assert!(topic_text(" Search ").is_some());
        assert!(topic_text("nope").is_none());
        assert!(topic_text(PUBLICATIONS_TOPIC).is_none());
    }

    #[test]
    fn publications_list() {
        let text = render_publications(&[
            Publication {
                name: "peepshow".to_owned(),
                series: vec![1, 2],
            },
            Publication {
                name: "xfm".to_owned(),
                series: vec![1],
            },
        ]);
        assert_eq!(
            text,
            "**publications**\n- `~peepshow` series 1, 2\n- `~xfm` series 1\n"
        );
        assert_eq!(render_publications(&[]), "Nothing has been ingested yet.");
    }
}
