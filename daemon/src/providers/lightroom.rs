use common::{FetchRequest, Image, Variant};
use rand::rng;
use rand::seq::SliceRandom;
use regex::Regex;
use std::sync::LazyLock;

use super::unescape_amp;
use crate::http::HttpRequest;
use crate::variants;

static SRCSET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"data-srcset="([^"]+)"#).expect("srcset pattern is valid"));

pub fn request(location: &str) -> HttpRequest {
    HttpRequest::get(format!("https://{}", location))
}

/// Images from the `data-srcset` attributes of a gallery page, in random order
pub fn parse(request: &FetchRequest, body: &str) -> Vec<Image> {
    let mut srcsets: Vec<&str> = SRCSET
        .captures_iter(body)
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
        .collect();
    srcsets.shuffle(&mut rng());

    let mut images = Vec::new();
    for srcset in srcsets {
        let mut variants = parse_srcset(srcset);
        let Some(url) = variants::select_primary(&mut variants) else {
            log::debug!("Skipping srcset without usable widths");
            continue;
        };

        images.push(Image {
            url,
            caption: None,
            variants,
        });

        if images.len() == request.maximum_entries {
            break;
        }
    }

    images
}

/// Split `url 640w, url 1024w` into variants; height is unknown and set to 1
fn parse_srcset(srcset: &str) -> Vec<Variant> {
    srcset
        .split(',')
        .filter_map(|candidate| {
            let mut parts = candidate.split_whitespace();
            let url = parts.next()?;
            let width = leading_number(parts.next()?)?;
            (width > 0).then(|| Variant::new(unescape_amp(url), width, 1))
        })
        .collect()
}

fn leading_number(descriptor: &str) -> Option<u32> {
    let digits: String = descriptor.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}
