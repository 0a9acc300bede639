//! Catalog search client.
//!
//! The reconciliation engine only sees the [`Catalog`] trait. [`CsfdClient`]
//! is the production implementation: it fetches the ČSFD search page and
//! scrapes the film result list. The scraping is tuned to that one page
//! layout and is not meant to generalize.

use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::blocking::Client;
use reqwest::header::USER_AGENT;
use thiserror::Error;
use tracing::debug;

use crate::models::CandidateRecord;
use crate::settings::{CRAWLER_USER_AGENT, CSFD_REQUEST_TIMEOUT, CSFD_SEARCH_URL};

/// The catalog could not be reached or answered with an error status.
#[derive(Debug, Error)]
pub enum ConnectivityError {
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("catalog answered HTTP {status} for {url}")]
    Status { url: String, status: u16 },
}

/// Search interface consumed by the reconciliation engine.
pub trait Catalog {
    /// Return the candidates for `query` in catalog order. No results is an
    /// empty vector, not an error.
    fn search(&mut self, query: &str) -> Result<Vec<CandidateRecord>, ConnectivityError>;
}

impl<C: Catalog + ?Sized> Catalog for Box<C> {
    fn search(&mut self, query: &str) -> Result<Vec<CandidateRecord>, ConnectivityError> {
        (**self).search(query)
    }
}

impl<C: Catalog + ?Sized> Catalog for &mut C {
    fn search(&mut self, query: &str) -> Result<Vec<CandidateRecord>, ConnectivityError> {
        (**self).search(query)
    }
}

// ============================================================================
// ČSFD client
// ============================================================================

/// Blocking ČSFD search client.
pub struct CsfdClient {
    client: Client,
    search_url: String,
}

impl CsfdClient {
    pub fn new() -> anyhow::Result<Self> {
        let client = Client::builder().timeout(CSFD_REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            search_url: CSFD_SEARCH_URL.to_string(),
        })
    }

    fn fetch(&self, query: &str) -> Result<String, ConnectivityError> {
        let request_error = |source| ConnectivityError::Request {
            url: self.search_url.clone(),
            source,
        };

        let response = self
            .client
            .get(&self.search_url)
            .query(&[("q", query)])
            .header(USER_AGENT, CRAWLER_USER_AGENT)
            .send()
            .map_err(request_error)?;

        let url = response.url().to_string();
        let status = response.status();
        // read the body even on error status to release the connection
        let body = response.text().map_err(request_error)?;
        if !status.is_success() {
            return Err(ConnectivityError::Status {
                url,
                status: status.as_u16(),
            });
        }
        debug!(%url, bytes = body.len(), "fetched search page");
        Ok(body)
    }
}

impl Catalog for CsfdClient {
    fn search(&mut self, query: &str) -> Result<Vec<CandidateRecord>, ConnectivityError> {
        let body = self.fetch(query)?;
        if body.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(parse_search_page(&body))
    }
}

// ============================================================================
// Search page scraping
// ============================================================================

static FILM_LIST: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)<ul[^>]*class="[^"]*ui-image-list[^"]*"[^>]*>(.*?)</ul>"#).unwrap()
});

static LIST_ITEM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<li(?:\s[^>]*)?>(.*?)</li>").unwrap());

static TITLE_LINK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?s)<h3[^>]*class="[^"]*subject[^"]*"[^>]*>.*?<a[^>]*class="[^"]*film[^"]*"[^>]*>(.*?)</a>"#,
    )
    .unwrap()
});

static PARAGRAPH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<p(?:\s[^>]*)?>(.*?)</p>").unwrap());

static LINE_BREAK: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<br\s*/?>").unwrap());

static TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]*>").unwrap());

static ENTITY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"&(#[xX][0-9a-fA-F]+|#[0-9]+|[a-zA-Z]+);").unwrap());

static SPACES: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t\r\u{a0}]+").unwrap());

const DIRECTOR_ROLE: &str = "Režie";
const ACTOR_ROLE: &str = "Hrají";

/// Extract candidates from a search results page, in page order.
pub fn parse_search_page(html: &str) -> Vec<CandidateRecord> {
    // The film list lives under #search-films; the page also lists people
    // and TV series in the same markup further down.
    let Some(films) = film_section(html) else {
        return Vec::new();
    };
    let Some(list) = FILM_LIST.captures(films).and_then(|c| c.get(1)) else {
        return Vec::new();
    };

    LIST_ITEM
        .captures_iter(list.as_str())
        .filter_map(|c| c.get(1))
        .map(|item| parse_film_item(item.as_str()))
        .collect()
}

/// The part of the page from `#search-films` up to the next search section.
fn film_section(html: &str) -> Option<&str> {
    const SECTION: &str = "id=\"search-";
    let start = html.find("id=\"search-films\"")?;
    let rest = &html[start..];
    let end = rest[SECTION.len()..]
        .find(SECTION)
        .map_or(rest.len(), |next| next + SECTION.len());
    Some(&rest[..end])
}

fn parse_film_item(item: &str) -> CandidateRecord {
    let title = TITLE_LINK
        .captures(item)
        .and_then(|c| c.get(1))
        .map(|m| html_text(m.as_str()))
        .unwrap_or_default();

    let paragraphs: Vec<&str> = PARAGRAPH
        .captures_iter(item)
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
        .collect();

    let details = paragraphs.first().map(|p| html_text(p)).unwrap_or_default();
    let (genres, countries, year) = parse_movie_details(&details);

    let roles_text = match paragraphs.len() {
        0 | 1 => String::new(),
        n => html_text(paragraphs[n - 1]),
    };
    let roles = parse_movie_roles(&roles_text);
    let directors = role_values(&roles, DIRECTOR_ROLE);
    let actors = role_values(&roles, ACTOR_ROLE);

    CandidateRecord {
        title,
        genre: nth(&genres, 0),
        genre2: nth(&genres, 1),
        country: nth(&countries, 0),
        country2: nth(&countries, 1),
        director: nth(directors, 0),
        actor: nth(actors, 0),
        actor2: nth(actors, 1),
        year: year.unwrap_or_default(),
    }
}

/// Split the details line: `"Akční / Životopisný, Francie / Velká Británie, 2017"`.
///
/// The country part may be missing, in which case the second part is the year.
pub fn parse_movie_details(details: &str) -> (Vec<String>, Vec<String>, Option<String>) {
    let parts: Vec<&str> = details.split(',').map(str::trim).collect();
    let genres = parts.first().copied().unwrap_or_default();
    let second = parts.get(1).copied().unwrap_or_default();

    let (countries, year) = if !second.is_empty() && second.chars().all(|c| c.is_ascii_digit()) {
        ("", Some(second.to_string()))
    } else {
        (
            second,
            parts.get(2).filter(|y| !y.is_empty()).map(|y| y.to_string()),
        )
    };

    (split_slashes(genres), split_slashes(countries), year)
}

/// Parse the roles block: `"Režie: Cédric Jimenez\nHrají: Jason Clarke, Rosamund Pike"`.
pub fn parse_movie_roles(text: &str) -> Vec<(String, Vec<String>)> {
    text.lines()
        .filter_map(|line| line.split_once(':'))
        .map(|(key, values)| {
            let names = values
                .split(',')
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
                .collect();
            (key.trim().to_string(), names)
        })
        .collect()
}

fn role_values<'a>(roles: &'a [(String, Vec<String>)], role: &str) -> &'a [String] {
    roles
        .iter()
        .find(|(key, _)| key == role)
        .map(|(_, values)| values.as_slice())
        .unwrap_or(&[])
}

fn split_slashes(part: &str) -> Vec<String> {
    part.split('/')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn nth(values: &[String], index: usize) -> String {
    values.get(index).cloned().unwrap_or_default()
}

/// Visible text of an HTML fragment. `<br>` becomes a newline; each line is
/// whitespace-collapsed and trimmed.
pub fn html_text(fragment: &str) -> String {
    let with_breaks = LINE_BREAK.replace_all(fragment, "\n");
    let stripped = TAG.replace_all(&with_breaks, "");
    let decoded = decode_entities(&stripped);
    decoded
        .lines()
        .map(|line| SPACES.replace_all(line, " ").trim().to_string())
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn decode_entities(text: &str) -> String {
    ENTITY
        .replace_all(text, |caps: &regex::Captures| {
            let entity = &caps[1];
            let decoded = match entity {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                "nbsp" => Some(' '),
                _ if entity.starts_with("#x") || entity.starts_with("#X") => {
                    u32::from_str_radix(&entity[2..], 16).ok().and_then(char::from_u32)
                }
                _ if entity.starts_with('#') => {
                    entity[1..].parse::<u32>().ok().and_then(char::from_u32)
                }
                _ => None,
            };
            decoded.map_or_else(|| caps[0].to_string(), |c| c.to_string())
        })
        .into_owned()
}
