use std::str::FromStr;

use beamtrack_contract::{BeamCriteria, PageRequest, UserId};
use tracing::{debug, warn};

/// Query-string state of the beam list and beam detail routes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteParams {
    pub tag: Option<String>,
    pub email: Option<String>,
    pub uid: Option<UserId>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub file_filter: Option<String>,
    pub file_page: Option<u32>,
}

impl RouteParams {
    /// Lenient parse: unknown keys are skipped, malformed numbers dropped.
    pub fn parse(query: &str) -> Self {
        let mut params = Self::default();
        let query = query.strip_prefix('?').unwrap_or(query);

        for pair in query.split('&').filter(|pair| !pair.is_empty()) {
            let (raw_key, raw_value) = pair.split_once('=').unwrap_or((pair, ""));
            let key = decode(raw_key);
            let value = decode(raw_value);

            match key.as_str() {
                "tag" => params.tag = non_empty(value),
                "email" => params.email = non_empty(value),
                "uid" => params.uid = number(&key, &value),
                "page" => params.page = number(&key, &value),
                "perPage" => params.per_page = number(&key, &value),
                "fileFilter" => params.file_filter = non_empty(value),
                "filePage" => params.file_page = number(&key, &value),
                _ => debug!(key = %key, "ignoring unknown query parameter"),
            }
        }
        params
    }

    pub fn to_query_string(&self) -> String {
        let mut pairs: Vec<(&str, String)> = Vec::new();
        if let Some(tag) = &self.tag {
            pairs.push(("tag", tag.clone()));
        }
        if let Some(email) = &self.email {
            pairs.push(("email", email.clone()));
        }
        if let Some(uid) = self.uid {
            pairs.push(("uid", uid.to_string()));
        }
        if let Some(page) = self.page {
            pairs.push(("page", page.to_string()));
        }
        if let Some(per_page) = self.per_page {
            pairs.push(("perPage", per_page.to_string()));
        }
        if let Some(filter) = &self.file_filter {
            pairs.push(("fileFilter", filter.clone()));
        }
        if let Some(page) = self.file_page {
            pairs.push(("filePage", page.to_string()));
        }

        pairs
            .into_iter()
            .filter(|(_, value)| !value.is_empty())
            .map(|(key, value)| format!("{key}={}", urlencoding::encode(&value)))
            .collect::<Vec<_>>()
            .join("&")
    }

    pub fn criteria(&self) -> BeamCriteria {
        BeamCriteria::from_filters(self.tag.as_deref(), self.email.as_deref(), self.uid)
    }

    /// Page and page size for the beam list; `perPage` overrides the default.
    pub fn page_request(&self, default_per_page: u32) -> PageRequest {
        PageRequest::new(
            self.page.unwrap_or(1),
            self.per_page.unwrap_or(default_per_page),
        )
    }
}

fn decode(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    match urlencoding::decode(&spaced) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => {
            warn!(value = %raw, "query parameter is not valid UTF-8; using it verbatim");
            spaced
        }
    }
}

fn non_empty(value: String) -> Option<String> {
    (!value.is_empty()).then_some(value)
}

fn number<T: FromStr>(key: &str, value: &str) -> Option<T> {
    match value.trim().parse() {
        Ok(number) => Some(number),
        Err(_) => {
            warn!(key, value, "ignoring malformed numeric query parameter");
            None
        }
    }
}
