// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// String-level helpers for CUPS device URIs.
//
// Device URIs are opaque `scheme:rest` strings.  Backends render the same
// device in different ways (`usb://HP/LaserJet%201020?serial=X` versus
// `hp:/usb/HP_LaserJet_1020?serial=X`), so besides exact comparison we offer
// a normalized comparison that tolerates escaping and vendor-prefix noise.

/// Characters delimiting tokens when looking for a serial number inside a URI.
const SERIAL_TOKEN_DELIMITERS: &[char] = &['?', '=', '&', '/'];

/// Percent-escapes that stand for word separators.
const ESCAPED_SEPARATORS: &[&str] = &["%20", "%2d", "%5f", "%2b", "%2c"];

/// Split a URI into `(scheme, rest)` at the first ':'.
pub fn split_scheme(uri: &str) -> Option<(&str, &str)> {
    uri.split_once(':')
}

/// The scheme of a URI, or `None` if it has no ':'.
pub fn scheme(uri: &str) -> Option<&str> {
    split_scheme(uri).map(|(scheme, _)| scheme)
}

/// Two URIs are twins when they differ in scheme but are byte-identical after
/// it: two functions (printer, scanner, fax) of one multi-function device.
///
/// Identical query strings on unrelated devices also look like twins; that is
/// a known false positive of this heuristic.
pub fn is_twin(a: &str, b: &str) -> bool {
    match (split_scheme(a), split_scheme(b)) {
        (Some((scheme_a, rest_a)), Some((scheme_b, rest_b))) => {
            scheme_a != scheme_b && rest_a == rest_b
        }
        _ => false,
    }
}

/// Twin test with the normalized comparison layered on top.
pub fn is_loose_twin(a: &str, b: &str) -> bool {
    if is_twin(a, b) {
        return true;
    }
    match (scheme(a), scheme(b)) {
        (Some(scheme_a), Some(scheme_b)) if scheme_a != scheme_b => {
            let (na, nb) = (normalize(a), normalize(b));
            !na.is_empty() && na == nb
        }
        _ => false,
    }
}

/// True if `serial` appears as a whole `?`/`=`/`&`/`/`-delimited token.
pub fn contains_serial_token(uri: &str, serial: &str) -> bool {
    !serial.is_empty()
        && uri
            .split(SERIAL_TOKEN_DELIMITERS)
            .any(|token| token == serial)
}

/// Reduce a device URI to a canonical form for loose comparison.
///
/// The scheme and leading `//` are dropped, the text is lowercased, escaped
/// separators and `_`/`+` become single spaces, and a repetition of the
/// vendor at the start of the model is removed.  The vendor segment itself
/// is kept:
///
/// `usb://HP/HP%20LaserJet%201020?serial=X` -> `hp/laserjet 1020?serial=x`
pub fn normalize(uri: &str) -> String {
    let rest = split_scheme(uri).map_or(uri, |(_, rest)| rest);
    let rest = rest.trim_start_matches('/').to_ascii_lowercase();
    let spaced = collapse_separators(&rest);

    let mut segments = spaced.splitn(2, '/');
    let vendor = segments.next().unwrap_or_default().trim();
    let Some(model) = segments.next() else {
        // No vendor segment to strip (e.g. `hp:/usb/...` after trimming has
        // one, `serial:/dev/ttyS0` has one; a bare `foo:bar` does not).
        return spaced.trim().to_owned();
    };

    let vendor_tokens: Vec<&str> = vendor.split(' ').filter(|t| !t.is_empty()).collect();
    let mut model = model.trim_start();
    for token in &vendor_tokens {
        match model.strip_prefix(token) {
            Some(stripped) if stripped.is_empty() || stripped.starts_with(' ') => {
                model = stripped.trim_start();
            }
            _ => break,
        }
    }
    format!("{vendor}/{}", model.trim())
}

fn collapse_separators(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(c) = rest.chars().next() {
        let escaped = ESCAPED_SEPARATORS.iter().find(|esc| rest.starts_with(**esc));
        let (is_space, advance) = match escaped {
            Some(esc) => (true, esc.len()),
            None => (c == ' ' || c == '_' || c == '+', c.len_utf8()),
        };
        if is_space {
            if !out.ends_with(' ') {
                out.push(' ');
            }
        } else {
            out.push(c);
        }
        rest = &rest[advance..];
    }
    out
}

/// Loose equivalence used when matching queue device URIs.
///
/// Byte-equal URIs are equivalent.  Otherwise the normalized forms must be
/// non-empty and one must contain the other on token boundaries: it starts
/// at the beginning of the text or after `/`, `?`, `&` or a space, and ends
/// at the end of the text or before `?`, `&` or `/`.  So `laserjet 1020`
/// matches neither `laserjet 1020n` nor `plaserjet 1020`.
pub fn equivalent(a: &str, b: &str) -> bool {
    if a == b {
        return true;
    }
    let (na, nb) = (normalize(a), normalize(b));
    if na.is_empty() || nb.is_empty() {
        return false;
    }
    let (short, long) = if na.len() <= nb.len() { (&na, &nb) } else { (&nb, &na) };
    long.match_indices(short.as_str()).any(|(at, _)| {
        let starts = matches!(long[..at].chars().next_back(), None | Some('/' | '?' | '&' | ' '));
        let ends = matches!(long[at + short.len()..].chars().next(), None | Some('?' | '&' | '/'));
        starts && ends
    })
}

/// True if a queue device URI refers to the legacy `usblp` character device
/// with the given index (`/dev/usb/lpN` or `/dev/usblpN`).
pub fn references_usblp(uri: &str, index: u32) -> bool {
    [format!("/dev/usb/lp{index}"), format!("/dev/usblp{index}")]
        .iter()
        .any(|needle| {
            uri.match_indices(needle.as_str()).any(|(at, _)| {
                !uri[at + needle.len()..]
                    .chars()
                    .next()
                    .is_some_and(|c| c.is_ascii_digit())
            })
        })
}

/// Rank of a URI's scheme in the preference list; lower is better and
/// unlisted schemes rank after all listed ones.
pub fn scheme_rank(uri: &str, preferred: &[String]) -> usize {
    scheme(uri)
        .and_then(|s| preferred.iter().position(|p| p == s))
        .unwrap_or(preferred.len())
}

/// True if the URI's scheme is on the preference list.
pub fn is_preferred_scheme(uri: &str, preferred: &[String]) -> bool {
    scheme_rank(uri, preferred) < preferred.len()
}

/// Move the best-ranked URI to the front, keeping the others in order.
/// Ties keep the earliest URI.
pub fn move_preferred_first(uris: &mut [String], preferred: &[String]) {
    let best = uris
        .iter()
        .enumerate()
        .min_by_key(|(i, uri)| (scheme_rank(uri, preferred), *i))
        .map(|(i, _)| i);
    if let Some(best) = best {
        uris[..=best].rotate_right(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prefs() -> Vec<String> {
        vec!["hp".into(), "usb".into()]
    }

    #[test]
    fn twins_differ_only_in_scheme() {
        assert!(is_twin("hp:foo?x=1", "usb:foo?x=1"));
        assert!(is_twin("usb:foo?x=1", "hp:foo?x=1"));
        assert!(!is_twin("hp:foo?x=1", "hp:foo?x=1"));
        assert!(!is_twin("hp:foo?x=1", "usb:foo?x=2"));
        assert!(!is_twin("noscheme", "usb:noscheme"));
    }

    #[test]
    fn serial_token_must_be_whole() {
        let uri = "usb://Acme/Inkjet3000?serial=XYZ123";
        assert!(contains_serial_token(uri, "XYZ123"));
        assert!(!contains_serial_token(uri, "XYZ"));
        assert!(!contains_serial_token(uri, ""));
        assert!(contains_serial_token("hp:/usb/Model?serial=S1&x=1", "S1"));
    }

    #[test]
    fn normalize_strips_repeated_vendor_and_escapes() {
        assert_eq!(
            normalize("usb://HP/HP%20LaserJet%201020?serial=X"),
            "hp/laserjet 1020?serial=x"
        );
        assert_eq!(
            normalize("hp:/usb/HP_LaserJet_1020?serial=X"),
            "usb/hp laserjet 1020?serial=x"
        );
        assert_eq!(normalize("usb://Acme/Inkjet%20%203000"), "acme/inkjet 3000");
        assert_eq!(normalize("foo:bar"), "bar");
    }

    #[test]
    fn equivalent_respects_boundaries() {
        assert!(equivalent("usb://HP/LaserJet%201020", "usb://HP/LaserJet%201020?serial=X"));
        assert!(equivalent("usb://HP/LaserJet%201020", "usb://hp/laserjet_1020"));
        assert!(equivalent("usb://HP/LaserJet%201020", "usb://HP/HP%20LaserJet%201020"));
        assert!(!equivalent("usb://HP/LaserJet%201020", "usb://HP/LaserJet%201020n"));
        assert!(equivalent("a:b", "a:b"));
        assert!(!equivalent("a:", "b:"));
    }

    #[test]
    fn equivalent_needs_token_start() {
        assert!(!equivalent("usb://Acme/Jet%20100?serial=1", "usb://Acme/Inkjet%20100?serial=1"));
        assert!(!equivalent("foo:Jet%20100", "usb://Acme/Inkjet%20100"));
        assert!(equivalent("foo:Inkjet%20100", "usb://Acme/Inkjet%20100"));
    }

    #[test]
    fn equivalent_keeps_vendors_apart() {
        assert!(!equivalent("usb://Canon/LBP%202900", "usb://Epson/LBP%202900"));
        assert!(!is_loose_twin("usb://Canon/LBP%202900", "hp://Epson/LBP%202900"));
    }

    #[test]
    fn loose_twin_requires_distinct_scheme() {
        assert!(is_loose_twin("usb://HP/LaserJet%201020?serial=X", "hpfax://HP/LaserJet_1020?serial=X"));
        assert!(!is_loose_twin("usb://HP/LaserJet%201020", "usb://hp/laserjet_1020"));
    }

    #[test]
    fn usblp_reference_checks_index() {
        assert!(references_usblp("parallel:/dev/usb/lp0", 0));
        assert!(references_usblp("serial:/dev/usblp1?baud=9600", 1));
        assert!(!references_usblp("parallel:/dev/usb/lp10", 1));
        assert!(!references_usblp("usb://Acme/X", 0));
    }

    #[test]
    fn preferred_scheme_moves_to_front() {
        let mut uris = vec![
            "usb://Acme/X?serial=1".to_string(),
            "hpfax:/usb/X?serial=1".to_string(),
            "hp:/usb/X?serial=1".to_string(),
        ];
        move_preferred_first(&mut uris, &prefs());
        assert_eq!(uris[0], "hp:/usb/X?serial=1");
        assert_eq!(uris[1], "usb://Acme/X?serial=1");
        assert_eq!(uris[2], "hpfax:/usb/X?serial=1");
    }

    #[test]
    fn rank_of_unlisted_scheme_is_last() {
        assert_eq!(scheme_rank("hp:/x", &prefs()), 0);
        assert_eq!(scheme_rank("usb://x", &prefs()), 1);
        assert_eq!(scheme_rank("hpfax:/x", &prefs()), 2);
        // "hp" must not match "hpfax" by prefix.
        assert!(!is_preferred_scheme("hpfax:/x", &prefs()));
    }
}
