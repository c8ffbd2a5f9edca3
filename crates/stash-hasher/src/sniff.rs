//! Media type sniffing from a payload prefix.
//!
//! Signatures are checked in order; the first match wins. Text heuristics run
//! only after every binary signature has failed.

use stash_types::MediaType;

struct Signature {
    offset: usize,
    magic: &'static [u8],
    mime: &'static str,
    extension: &'static str,
}

const fn sig(
    offset: usize,
    magic: &'static [u8],
    mime: &'static str,
    extension: &'static str,
) -> Signature {
    Signature {
        offset,
        magic,
        mime,
        extension,
    }
}

const SIGNATURES: &[Signature] = &[
    sig(0, b"\x89PNG\r\n\x1a\n", "image/png", ".png"),
    sig(0, b"\xff\xd8\xff", "image/jpeg", ".jpg"),
    sig(0, b"GIF87a", "image/gif", ".gif"),
    sig(0, b"GIF89a", "image/gif", ".gif"),
    sig(0, b"BM", "image/bmp", ".bmp"),
    sig(0, b"\x00\x00\x01\x00", "image/x-icon", ".ico"),
    sig(0, b"II*\x00", "image/tiff", ".tiff"),
    sig(0, b"MM\x00*", "image/tiff", ".tiff"),
    sig(0, b"%PDF-", "application/pdf", ".pdf"),
    sig(0, b"PK\x03\x04", "application/zip", ".zip"),
    sig(0, b"\x1f\x8b", "application/gzip", ".gz"),
    sig(0, b"7z\xbc\xaf\x27\x1c", "application/x-7z-compressed", ".7z"),
    sig(0, b"Rar!\x1a\x07", "application/x-rar-compressed", ".rar"),
    sig(0, b"\x1a\x45\xdf\xa3", "video/webm", ".webm"),
    sig(0, b"ID3", "audio/mpeg", ".mp3"),
    sig(0, b"OggS", "audio/ogg", ".ogg"),
    sig(0, b"fLaC", "audio/flac", ".flac"),
    sig(0, b"\x00asm", "application/wasm", ".wasm"),
];

/// Sniff the media type of a payload from its leading bytes.
pub fn sniff(prefix: &[u8]) -> MediaType {
    if let Some(found) = SIGNATURES
        .iter()
        .find(|s| prefix.get(s.offset..s.offset + s.magic.len()) == Some(s.magic))
    {
        return MediaType::new(found.mime, found.extension);
    }
    if let Some(media) = sniff_riff(prefix).or_else(|| sniff_ftyp(prefix)) {
        return media;
    }
    if prefix.len() >= 2 && prefix[0] == 0xff && prefix[1] & 0xe0 == 0xe0 {
        return MediaType::new("audio/mpeg", ".mp3");
    }
    sniff_text(prefix).unwrap_or_else(MediaType::octet_stream)
}

fn sniff_riff(prefix: &[u8]) -> Option<MediaType> {
    if prefix.get(0..4)? != b"RIFF" {
        return None;
    }
    match prefix.get(8..12)? {
        b"WEBP" => Some(MediaType::new("image/webp", ".webp")),
        b"WAVE" => Some(MediaType::new("audio/wav", ".wav")),
        b"AVI " => Some(MediaType::new("video/x-msvideo", ".avi")),
        _ => None,
    }
}

fn sniff_ftyp(prefix: &[u8]) -> Option<MediaType> {
    if prefix.get(4..8)? != b"ftyp" {
        return None;
    }
    let media = match prefix.get(8..12)? {
        b"qt  " => MediaType::new("video/quicktime", ".mov"),
        b"M4A " | b"M4B " => MediaType::new("audio/x-m4a", ".m4a"),
        b"avif" => MediaType::new("image/avif", ".avif"),
        b"heic" | b"heix" => MediaType::new("image/heic", ".heic"),
        _ => MediaType::new("video/mp4", ".mp4"),
    };
    Some(media)
}

fn sniff_text(prefix: &[u8]) -> Option<MediaType> {
    if prefix.is_empty() || prefix.contains(&0) {
        return None;
    }
    // A multi-byte sequence may be cut at the end of the prefix.
    let text = match std::str::from_utf8(prefix) {
        Ok(text) => text,
        Err(e) if e.error_len().is_none() => std::str::from_utf8(&prefix[..e.valid_up_to()]).ok()?,
        Err(_) => return None,
    };
    let trimmed = text.trim_start_matches('\u{feff}').trim_start();
    let lower: String = trimmed.chars().take(64).collect::<String>().to_ascii_lowercase();

    let media = if lower.starts_with("<svg") || (lower.starts_with("<?xml") && trimmed.contains("<svg"))
    {
        MediaType::new("image/svg+xml", ".svg")
    } else if lower.starts_with("<!doctype html") || lower.starts_with("<html") {
        MediaType::new("text/html; charset=utf-8", ".html")
    } else if lower.starts_with("<?xml") {
        MediaType::new("text/xml; charset=utf-8", ".xml")
    } else if looks_like_json(trimmed) {
        MediaType::new("application/json", ".json")
    } else {
        MediaType::new("text/plain; charset=utf-8", ".txt")
    };
    Some(media)
}

fn looks_like_json(text: &str) -> bool {
    let end = text.trim_end();
    (text.starts_with('{') && end.ends_with('}')) || (text.starts_with('[') && end.ends_with(']'))
}
