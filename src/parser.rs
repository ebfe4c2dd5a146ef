// src/parser.rs
//! Tolerant feed parser for RSS 2.0, RDF-RSS 1.0 and Atom 1.0. Works on raw
//! XML events so a malformed block skips one entry, never the whole feed.
//! CDATA is unwrapped, entities (named and numeric) are decoded, and
//! descriptions come out as plain collapsed text.

use once_cell::sync::OnceCell;
use quick_xml::events::Event;
use quick_xml::Reader;

use crate::registry::FeedSource;

/// Entries parsed per source; anything past this is tail noise.
pub const MAX_PER_SOURCE: usize = 120;

#[derive(Debug, Clone, PartialEq)]
pub struct RawItem {
    pub src: String,
    pub title: String,
    pub link: String,
    pub description: String,
    pub pub_text: String,
    pub weight: f64,
    pub region: String,
}

/// What the current text events belong to. Priorities pick the best of
/// several date/description variants: lower wins.
#[derive(Debug, Clone, PartialEq)]
enum Field {
    None,
    Title,
    Link,
    Guid,
    Date(u8),
    Desc(u8),
}

#[derive(Default)]
struct EntryDraft {
    title: String,
    link_text: String,
    guid: String,
    atom_alternate: Option<String>,
    atom_any_href: Option<String>,
    best_date: Option<(u8, String)>,
    best_desc: Option<(u8, String)>,
}

impl EntryDraft {
    fn push_text(&mut self, field: &Field, text: &str) {
        match field {
            Field::Title => self.title.push_str(text),
            Field::Link => self.link_text.push_str(text),
            Field::Guid => self.guid.push_str(text),
            Field::Date(prio) => match &mut self.best_date {
                Some((best, buf)) if *best == *prio => buf.push_str(text),
                Some((best, _)) if *best < *prio => {}
                _ => self.best_date = Some((*prio, text.to_string())),
            },
            Field::Desc(prio) => match &mut self.best_desc {
                Some((best, buf)) if *best == *prio => buf.push_str(text),
                Some((best, _)) if *best < *prio => {}
                _ => self.best_desc = Some((*prio, text.to_string())),
            },
            Field::None => {}
        }
    }

    fn finalize(self, source: &FeedSource) -> Option<RawItem> {
        let title = collapse_ws(&decode_entities(&self.title));

        let link_text = self.link_text.trim().to_string();
        let guid = self.guid.trim().to_string();
        let link = self
            .atom_alternate
            .or(self.atom_any_href)
            .filter(|l| !l.trim().is_empty())
            .unwrap_or(link_text);
        let link = if link.trim().is_empty() && looks_like_url(&guid) {
            guid
        } else {
            link
        };
        let link = decode_entities(link.trim()).trim().to_string();

        if title.is_empty() && link.is_empty() {
            return None;
        }

        let description = self
            .best_desc
            .map(|(_, d)| clean_text(&d))
            .unwrap_or_default();
        let pub_text = self
            .best_date
            .map(|(_, d)| d.trim().to_string())
            .unwrap_or_default();

        Some(RawItem {
            src: source.src.clone(),
            title,
            link,
            description,
            pub_text,
            weight: source.weight,
            region: source.region.clone(),
        })
    }
}

/// Parse one feed payload into raw items. Never errors: unreadable XML just
/// yields whatever was parsed before the damage.
pub fn parse_feed(source: &FeedSource, xml: &str) -> Vec<RawItem> {
    let mut reader = Reader::from_str(xml);
    let mut items = Vec::new();

    let mut in_entry = false;
    let mut field = Field::None;
    let mut field_tag: Vec<u8> = Vec::new();
    let mut draft = EntryDraft::default();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let local = e.local_name().as_ref().to_vec();
                if !in_entry {
                    if local == b"item" || local == b"entry" {
                        in_entry = true;
                        field = Field::None;
                        draft = EntryDraft::default();
                    }
                    continue;
                }
                // Inside an entry: only bind a field when none is open, so
                // markup embedded in descriptions cannot hijack the state.
                if field != Field::None {
                    continue;
                }
                let name = e.name().as_ref().to_vec();
                if local == b"link" {
                    capture_link_attrs(&e, &mut draft);
                }
                if let Some(f) = field_for(&name, &local) {
                    field = f;
                    field_tag = local;
                }
            }
            Ok(Event::Empty(e)) => {
                if in_entry && e.local_name().as_ref() == b"link" {
                    capture_link_attrs(&e, &mut draft);
                }
            }
            Ok(Event::Text(t)) => {
                if in_entry && field != Field::None {
                    let raw = String::from_utf8_lossy(t.as_ref()).into_owned();
                    draft.push_text(&field, &raw);
                }
            }
            Ok(Event::CData(c)) => {
                if in_entry && field != Field::None {
                    let raw = String::from_utf8_lossy(c.into_inner().as_ref()).into_owned();
                    draft.push_text(&field, &raw);
                }
            }
            // Entity references come through as their own events; rebuild the
            // textual form and let the entity decoder handle it with the rest.
            Ok(Event::GeneralRef(r)) => {
                if in_entry && field != Field::None {
                    let name = String::from_utf8_lossy(r.as_ref()).into_owned();
                    draft.push_text(&field, &format!("&{name};"));
                }
            }
            Ok(Event::End(e)) => {
                let local = e.local_name().as_ref().to_vec();
                if in_entry && (local == b"item" || local == b"entry") {
                    in_entry = false;
                    field = Field::None;
                    if let Some(item) = std::mem::take(&mut draft).finalize(source) {
                        items.push(item);
                        if items.len() >= MAX_PER_SOURCE {
                            break;
                        }
                    }
                } else if field != Field::None && local == field_tag {
                    field = Field::None;
                }
            }
            Ok(Event::Eof) => break,
            Err(_) => break, // damaged tail; keep what we have
            Ok(_) => {}
        }
    }

    items
}

fn field_for(name: &[u8], local: &[u8]) -> Option<Field> {
    match local {
        b"title" => Some(Field::Title),
        b"link" => Some(Field::Link),
        b"guid" | b"id" => Some(Field::Guid),
        b"pubDate" => Some(Field::Date(0)),
        b"updated" => Some(Field::Date(1)),
        b"published" => Some(Field::Date(2)),
        b"date" if name.ends_with(b"dc:date") || name == b"date" => Some(Field::Date(3)),
        b"description" => Some(Field::Desc(0)),
        b"summary" => Some(Field::Desc(1)),
        b"content" | b"encoded" => Some(Field::Desc(2)),
        _ => None,
    }
}

fn capture_link_attrs(e: &quick_xml::events::BytesStart<'_>, draft: &mut EntryDraft) {
    let mut rel: Option<String> = None;
    let mut href: Option<String> = None;
    for attr in e.attributes().flatten() {
        let key = attr.key.as_ref();
        let val = decode_entities(&String::from_utf8_lossy(&attr.value));
        match key {
            b"rel" => rel = Some(val),
            b"href" => href = Some(val),
            _ => {}
        }
    }
    if let Some(href) = href.filter(|h| !h.trim().is_empty()) {
        match rel.as_deref() {
            Some("alternate") => {
                if draft.atom_alternate.is_none() {
                    draft.atom_alternate = Some(href);
                }
            }
            _ => {
                if draft.atom_any_href.is_none() {
                    draft.atom_any_href = Some(href);
                }
            }
        }
    }
}

fn looks_like_url(s: &str) -> bool {
    s.starts_with("http://") || s.starts_with("https://")
}

/// Named and numeric entity decoding (`&amp;`, `&#39;`, `&#x2019;`, …).
pub fn decode_entities(s: &str) -> String {
    html_escape::decode_html_entities(s).into_owned()
}

/// Strip scripts, styles and markup; decode entities; collapse whitespace.
pub fn clean_text(s: &str) -> String {
    static RE_SCRIPT: OnceCell<regex::Regex> = OnceCell::new();
    static RE_STYLE: OnceCell<regex::Regex> = OnceCell::new();
    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();

    let mut out = decode_entities(s);
    let re_script =
        RE_SCRIPT.get_or_init(|| regex::Regex::new(r"(?is)<script[^>]*>.*?</script>").unwrap());
    out = re_script.replace_all(&out, " ").into_owned();
    let re_style =
        RE_STYLE.get_or_init(|| regex::Regex::new(r"(?is)<style[^>]*>.*?</style>").unwrap());
    out = re_style.replace_all(&out, " ").into_owned();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, " ").into_owned();
    collapse_ws(&out)
}

pub fn collapse_ws(s: &str) -> String {
    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    re_ws.replace_all(s, " ").trim().to_string()
}

/// Published-date parsing: RFC 2822 (RSS), RFC 3339 (Atom, dc:date), then a
/// bare `YYYY-MM-DD HH:MM:SS` seen in sloppy feeds. `None` means "use now".
pub fn parse_date_ms(s: &str) -> Option<i64> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = chrono::DateTime::parse_from_rfc2822(s) {
        return Some(dt.timestamp_millis());
    }
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(s) {
        return Some(dt.timestamp_millis());
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(ndt.and_utc().timestamp_millis());
    }
    None
}
