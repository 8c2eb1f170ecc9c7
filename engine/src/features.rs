use scraper::{ElementRef, Html, Selector};
use tracing::debug;
use url::Url;

/// Nominal length of the vector produced by [`FeatureExtractor::extract`].
pub const FEATURE_COUNT: usize = 45;

/// Parsed page markup plus the URL it was fetched from, when known.
pub struct PageDocument {
    html: Html,
    origin: Option<Url>,
}

impl PageDocument {
    /// Parse raw response bytes. Invalid UTF-8 is replaced and malformed
    /// markup is repaired by the HTML5 parser, so this cannot fail.
    pub fn parse(bytes: &[u8], origin: Option<&str>) -> Self {
        let markup = String::from_utf8_lossy(bytes);
        Self::from_html(&markup, origin)
    }

    pub fn from_html(markup: &str, origin: Option<&str>) -> Self {
        Self {
            html: Html::parse_document(markup),
            origin: origin.and_then(|o| Url::parse(o).ok()),
        }
    }

    pub fn empty() -> Self {
        Self::from_html("", None)
    }

    pub fn origin(&self) -> Option<&Url> {
        self.origin.as_ref()
    }

    fn select_all(&self, css: &str) -> Vec<ElementRef<'_>> {
        match Selector::parse(css) {
            Ok(selector) => self.html.select(&selector).collect(),
            Err(_) => Vec::new(),
        }
    }

    fn first(&self, css: &str) -> Option<ElementRef<'_>> {
        let selector = Selector::parse(css).ok()?;
        self.html.select(&selector).next()
    }

    fn count(&self, css: &str) -> usize {
        match Selector::parse(css) {
            Ok(selector) => self.html.select(&selector).count(),
            Err(_) => 0,
        }
    }

    fn title(&self) -> String {
        self.first("title")
            .map(|el| el.text().collect::<String>().trim().to_string())
            .unwrap_or_default()
    }
}

enum Probe {
    Has(&'static str),
    Count(&'static str),
    Custom(fn(&PageDocument) -> f64),
    BrandMismatch,
}

struct Signal {
    name: &'static str,
    probe: Probe,
}

const fn signal(name: &'static str, probe: Probe) -> Signal {
    Signal { name, probe }
}

/// Signal table. Order is part of the model contract: every classifier
/// artifact was fitted against vectors laid out exactly like this.
const SIGNALS: [Signal; FEATURE_COUNT] = [
    signal("has_title", Probe::Custom(has_title)),
    signal("has_input", Probe::Has("input")),
    signal("has_button", Probe::Has("button")),
    signal("has_image", Probe::Has("img")),
    signal("has_submit", Probe::Has(r#"input[type="submit"], button[type="submit"]"#)),
    signal("has_link", Probe::Has("link")),
    signal("has_password", Probe::Has(r#"input[type="password"]"#)),
    signal("has_email_input", Probe::Has(r#"input[type="email"]"#)),
    signal("has_hidden_element", Probe::Has(r#"input[type="hidden"], [hidden]"#)),
    signal("has_audio", Probe::Has("audio")),
    signal("has_video", Probe::Has("video")),
    signal("number_of_inputs", Probe::Count("input")),
    signal("number_of_buttons", Probe::Count("button")),
    signal("number_of_images", Probe::Count("img")),
    signal("number_of_option", Probe::Count("option")),
    signal("number_of_list", Probe::Count("li")),
    signal("number_of_th", Probe::Count("th")),
    signal("number_of_tr", Probe::Count("tr")),
    signal("number_of_href", Probe::Count("a[href]")),
    signal("number_of_paragraph", Probe::Count("p")),
    signal("number_of_script", Probe::Count("script")),
    signal("length_of_title", Probe::Custom(length_of_title)),
    signal("has_h1", Probe::Has("h1")),
    signal("has_h2", Probe::Has("h2")),
    signal("has_h3", Probe::Has("h3")),
    signal("length_of_text", Probe::Custom(length_of_text)),
    signal("number_of_clickable_button", Probe::Count(r#"button[type="button"]"#)),
    signal("number_of_a", Probe::Count("a")),
    signal("number_of_forms", Probe::Count("form")),
    signal("number_of_div", Probe::Count("div")),
    signal("number_of_external_links", Probe::Custom(number_of_external_links)),
    signal("has_footer", Probe::Has("footer")),
    signal("has_form", Probe::Has("form")),
    signal("has_text_area", Probe::Has("textarea")),
    signal("has_iframe", Probe::Has("iframe")),
    signal("has_text_input", Probe::Has(r#"input[type="text"], input:not([type])"#)),
    signal("number_of_meta", Probe::Count("meta")),
    signal("has_nav", Probe::Has("nav")),
    signal("has_external_form_action", Probe::Custom(has_external_form_action)),
    signal("has_picture", Probe::Has("picture")),
    signal("number_of_sources", Probe::Count("source")),
    signal("number_of_span", Probe::Count("span")),
    signal("number_of_table", Probe::Count("table")),
    signal("number_of_null_anchors", Probe::Custom(number_of_null_anchors)),
    signal("has_brand_mismatch", Probe::BrandMismatch),
];

/// Names of the signals in vector order.
pub fn feature_names() -> impl Iterator<Item = &'static str> {
    SIGNALS.iter().map(|s| s.name)
}

pub struct FeatureExtractor {
    popular_brands: Vec<&'static str>,
    brand_similarity: f64,
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl FeatureExtractor {
    pub fn new() -> Self {
        let popular_brands = vec![
            "paypal", "apple", "microsoft", "google", "facebook", "amazon", "netflix",
            "instagram", "linkedin", "ebay", "outlook", "office", "dropbox", "github",
            "wellsfargo", "chase", "icloud", "yahoo", "whatsapp", "binance",
        ];
        Self {
            popular_brands,
            brand_similarity: 0.9,
        }
    }

    /// Compute every signal for `doc`. Always returns [`FEATURE_COUNT`]
    /// values; a signal with nothing to measure yields 0.
    pub fn extract(&self, doc: &PageDocument) -> Vec<f64> {
        let vector: Vec<f64> = SIGNALS
            .iter()
            .map(|signal| {
                let value = match &signal.probe {
                    Probe::Has(css) => flag(doc.count(css) > 0),
                    Probe::Count(css) => doc.count(css) as f64,
                    Probe::Custom(compute) => compute(doc),
                    Probe::BrandMismatch => self.brand_mismatch(doc),
                };
                if value.is_finite() {
                    value
                } else {
                    0.0
                }
            })
            .collect();

        debug!(
            non_zero = vector.iter().filter(|v| **v != 0.0).count(),
            "Extracted {} features",
            vector.len()
        );
        vector
    }

    /// Title token imitating a well-known brand on a host that isn't the
    /// brand's own.
    fn brand_mismatch(&self, doc: &PageDocument) -> f64 {
        let Some(host) = doc.origin().and_then(canonical_host) else {
            return 0.0;
        };
        let title = doc.title().to_lowercase();

        let imitated = title
            .split(|c: char| !c.is_alphanumeric())
            .filter(|token| token.len() >= 4)
            .any(|token| {
                self.popular_brands.iter().any(|brand| {
                    strsim::jaro_winkler(token, brand) >= self.brand_similarity
                        && !host.contains(brand)
                })
            });
        flag(imitated)
    }
}

fn flag(value: bool) -> f64 {
    if value {
        1.0
    } else {
        0.0
    }
}

fn has_title(doc: &PageDocument) -> f64 {
    flag(!doc.title().is_empty())
}

fn length_of_title(doc: &PageDocument) -> f64 {
    doc.title().chars().count() as f64
}

/// Characters of rendered body text, ignoring script and style contents.
fn length_of_text(doc: &PageDocument) -> f64 {
    let Some(body) = doc.first("body") else {
        return 0.0;
    };
    body.descendants()
        .filter_map(|node| {
            let text = node.value().as_text()?;
            let parent = node.parent()?;
            let tag = parent.value().as_element()?.name();
            if matches!(tag, "script" | "style" | "noscript" | "template") {
                None
            } else {
                Some(text.trim().chars().count())
            }
        })
        .sum::<usize>() as f64
}

fn is_null_anchor(href: &str) -> bool {
    let href = href.trim().to_lowercase();
    href.is_empty() || href.starts_with('#') || href.starts_with("javascript:")
}

fn number_of_null_anchors(doc: &PageDocument) -> f64 {
    doc.select_all("a[href]")
        .iter()
        .filter_map(|a| a.value().attr("href"))
        .filter(|href| is_null_anchor(href))
        .count() as f64
}

fn number_of_external_links(doc: &PageDocument) -> f64 {
    let Some(origin) = doc.origin() else {
        return 0.0;
    };
    let Some(own_host) = canonical_host(origin) else {
        return 0.0;
    };

    doc.select_all("a[href]")
        .iter()
        .filter_map(|a| a.value().attr("href"))
        .filter(|href| !is_null_anchor(href))
        .filter_map(|href| origin.join(href.trim()).ok())
        .filter(|target| matches!(target.scheme(), "http" | "https"))
        .filter(|target| canonical_host(target).is_some_and(|host| host != own_host))
        .count() as f64
}

fn has_external_form_action(doc: &PageDocument) -> f64 {
    let Some(origin) = doc.origin() else {
        return 0.0;
    };
    let Some(own_host) = canonical_host(origin) else {
        return 0.0;
    };

    let external = doc
        .select_all("form[action]")
        .iter()
        .filter_map(|form| form.value().attr("action"))
        .map(str::trim)
        .filter(|action| !action.is_empty())
        .filter_map(|action| origin.join(action).ok())
        .any(|target| canonical_host(&target).is_some_and(|host| host != own_host));
    flag(external)
}

/// Lowercased ASCII (punycode) host without a leading `www.`.
fn canonical_host(url: &Url) -> Option<String> {
    let host = url.host_str()?.to_lowercase();
    let ascii = idna::domain_to_ascii(&host).unwrap_or(host);
    Some(ascii.strip_prefix("www.").map(str::to_string).unwrap_or(ascii))
}
