//! Logiqx XML (`<datafile><header/><game><rom/></game></datafile>`).

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use super::{ParseWarning, RawCatalog, RawRom};
use crate::error::ParseError;

#[derive(Clone, Copy)]
enum HeaderField {
    Name,
    Description,
    Version,
    Author,
    Homepage,
}

fn read_attrs(e: &BytesStart<'_>) -> Result<Vec<(String, String)>, String> {
    e.attributes()
        .map(|attr| {
            let attr = attr.map_err(|err| err.to_string())?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).to_ascii_lowercase();
            let value = attr
                .unescape_value()
                .map_err(|err| err.to_string())?
                .into_owned();
            Ok((key, value))
        })
        .collect()
}

fn attr<'a>(attrs: &'a [(String, String)], key: &str) -> Option<&'a str> {
    attrs
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

fn rom_from_attrs(game_name: &str, attrs: &[(String, String)]) -> RawRom {
    let get = |key: &str| attr(attrs, key).map(str::to_string);
    RawRom {
        game_name: game_name.to_string(),
        game_region: None,
        game_languages: None,
        name: get("name"),
        size: get("size"),
        crc: get("crc"),
        md5: get("md5"),
        sha1: get("sha1"),
        sha256: get("sha256"),
        status: get("status"),
    }
}

pub fn parse(text: &str) -> Result<RawCatalog, ParseError> {
    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(true);

    let mut catalog = RawCatalog::default();
    let mut in_header = false;
    let mut header_field: Option<HeaderField> = None;
    let mut current_game: Option<String> = None;
    // First rom of the open game, so a `<release>` can tag roms read before it.
    let mut game_start = 0;
    let mut release: (Option<String>, Option<String>) = (None, None);
    let mut saw_root = false;

    loop {
        let event = match reader.read_event() {
            Ok(event) => event,
            Err(err) => {
                let reason = format!(
                    "XML error at byte {}: {err}",
                    reader.buffer_position()
                );
                if catalog.roms.is_empty() {
                    return Err(ParseError::Malformed(reason));
                }
                catalog.warnings.push(ParseWarning::Truncated {
                    reason,
                    entries_read: catalog.roms.len(),
                });
                break;
            }
        };

        match event {
            Event::Start(ref e) | Event::Empty(ref e) => {
                let is_empty = matches!(event, Event::Empty(_));
                match e.name().as_ref() {
                    b"datafile" => saw_root = true,
                    b"header" => in_header = !is_empty,
                    b"game" | b"machine" => {
                        catalog.games_seen += 1;
                        let name = read_attrs(e)
                            .ok()
                            .and_then(|a| attr(&a, "name").map(str::to_string))
                            .unwrap_or_default();
                        current_game = if is_empty { None } else { Some(name) };
                        game_start = catalog.roms.len();
                        release = (None, None);
                    }
                    b"release" if current_game.is_some() && release.0.is_none() => {
                        let attrs = read_attrs(e).unwrap_or_default();
                        release = (
                            attr(&attrs, "region").map(str::to_string),
                            attr(&attrs, "language").map(str::to_string),
                        );
                        for rom in &mut catalog.roms[game_start..] {
                            rom.game_region = release.0.clone();
                            rom.game_languages = release.1.clone();
                        }
                    }
                    b"rom" | b"disk" => {
                        let Some(game) = current_game.as_deref() else {
                            continue;
                        };
                        match read_attrs(e) {
                            Ok(attrs) => {
                                let mut rom = rom_from_attrs(game, &attrs);
                                rom.game_region = release.0.clone();
                                rom.game_languages = release.1.clone();
                                catalog.roms.push(rom);
                            }
                            Err(reason) => catalog.warnings.push(ParseWarning::MalformedEntry {
                                game: game.to_string(),
                                rom: String::new(),
                                reason,
                            }),
                        }
                    }
                    tag if in_header && !is_empty => {
                        header_field = match tag {
                            b"name" => Some(HeaderField::Name),
                            b"description" => Some(HeaderField::Description),
                            b"version" => Some(HeaderField::Version),
                            b"author" => Some(HeaderField::Author),
                            b"homepage" => Some(HeaderField::Homepage),
                            _ => None,
                        };
                    }
                    _ => {}
                }
            }
            Event::Text(t) => {
                if let Some(field) = header_field {
                    let value = t
                        .unescape()
                        .map(|v| v.trim().to_string())
                        .unwrap_or_default();
                    let header = &mut catalog.header;
                    match field {
                        HeaderField::Name => header.name = value,
                        HeaderField::Description => header.description = value,
                        HeaderField::Version => header.version = value,
                        HeaderField::Author => header.author = value,
                        HeaderField::Homepage => header.homepage = value,
                    }
                }
            }
            Event::End(e) => match e.name().as_ref() {
                b"header" => {
                    in_header = false;
                    header_field = None;
                }
                b"game" | b"machine" => current_game = None,
                _ => header_field = None,
            },
            Event::Eof => break,
            _ => {}
        }
    }

    if !saw_root && catalog.games_seen == 0 {
        return Err(ParseError::Malformed(
            "XML document has no <datafile> root".to_string(),
        ));
    }
    Ok(catalog)
}
