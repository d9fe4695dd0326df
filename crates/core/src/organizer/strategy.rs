//! Organization strategies: a closed set of layouts, composable with `+`.
//!
//! Each strategy contributes zero or more directory levels; the file name is
//! always the catalog's rom name. `1g1r` contributes no directory, it only
//! narrows the selection to one variant per game.

use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::dat::names::{base_name, Revision};
use crate::error::Error;
use crate::matching::Identification;

/// Region ranking used by `1g1r` when no preference is configured.
pub const DEFAULT_REGION_PRIORITY: &[&str] = &[
    "USA",
    "World",
    "Europe",
    "Japan",
    "Brazil",
    "Korea",
    "China",
    "Germany",
    "France",
    "Spain",
    "Italy",
    "Australia",
    "Asia",
    "Netherlands",
    "Sweden",
    "Russia",
];

/// Catalog system names and the folder EmulationStation expects for them.
const EMULATIONSTATION_SYSTEMS: &[(&str, &str)] = &[
    ("nintendo - nintendo entertainment system", "nes"),
    ("nintendo - family computer disk system", "fds"),
    ("nintendo - super nintendo entertainment system", "snes"),
    ("nintendo - nintendo 64", "n64"),
    ("nintendo - game boy", "gb"),
    ("nintendo - game boy color", "gbc"),
    ("nintendo - game boy advance", "gba"),
    ("nintendo - nintendo ds", "nds"),
    ("nintendo - virtual boy", "virtualboy"),
    ("nintendo - gamecube", "gc"),
    ("sega - master system - mark iii", "mastersystem"),
    ("sega - mega drive - genesis", "megadrive"),
    ("sega - game gear", "gamegear"),
    ("sega - 32x", "sega32x"),
    ("sega - mega-cd - sega cd", "segacd"),
    ("sega - saturn", "saturn"),
    ("sega - dreamcast", "dreamcast"),
    ("sega - sg-1000", "sg-1000"),
    ("nec - pc engine - turbografx-16", "pcengine"),
    ("nec - pc engine - turbografx 16", "pcengine"),
    ("atari - 2600", "atari2600"),
    ("atari - 5200", "atari5200"),
    ("atari - 7800", "atari7800"),
    ("atari - lynx", "atarilynx"),
    ("atari - jaguar", "atarijaguar"),
    ("sony - playstation", "psx"),
    ("sony - playstation 2", "ps2"),
    ("sony - playstation portable", "psp"),
    ("snk - neo geo pocket", "ngp"),
    ("snk - neo geo pocket color", "ngpc"),
    ("bandai - wonderswan", "wonderswan"),
    ("bandai - wonderswan color", "wonderswancolor"),
    ("coleco - colecovision", "colecovision"),
    ("mattel - intellivision", "intellivision"),
    ("gce - vectrex", "vectrex"),
    ("microsoft - msx", "msx"),
];

/// Folder name EmulationStation uses for a catalog system.
pub fn emulationstation_folder(system: &str) -> String {
    let normalized = base_name(system);
    if let Some((_, folder)) = EMULATIONSTATION_SYSTEMS
        .iter()
        .find(|(name, _)| *name == normalized)
    {
        return (*folder).to_string();
    }
    let fallback: String = normalized
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect();
    if fallback.is_empty() {
        "unknown".to_string()
    } else {
        fallback
    }
}

/// One layout in the closed strategy set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StrategyKind {
    System,
    OneGameOneRom,
    Region,
    Alphabetical,
    EmulationStation,
    Flat,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 6] = [
        StrategyKind::System,
        StrategyKind::OneGameOneRom,
        StrategyKind::Region,
        StrategyKind::Alphabetical,
        StrategyKind::EmulationStation,
        StrategyKind::Flat,
    ];

    /// Stable identifier accepted by [`Strategy::from_str`].
    pub fn id(&self) -> &'static str {
        match self {
            StrategyKind::System => "system",
            StrategyKind::OneGameOneRom => "1g1r",
            StrategyKind::Region => "region",
            StrategyKind::Alphabetical => "alphabetical",
            StrategyKind::EmulationStation => "emulationstation",
            StrategyKind::Flat => "flat",
        }
    }

    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|k| k.id().eq_ignore_ascii_case(id.trim()))
    }

    pub fn describe(&self) -> &'static str {
        match self {
            StrategyKind::System => "By System - per-system folders (multi-DAT)",
            StrategyKind::OneGameOneRom => "One Game, One ROM - keep the best version per game",
            StrategyKind::Region => "By Region - region folders",
            StrategyKind::Alphabetical => "Alphabetical - A-Z folders",
            StrategyKind::EmulationStation => "EmulationStation - roms/<system> folders",
            StrategyKind::Flat => "Flat - proper names, no subfolders",
        }
    }

    fn directories(&self, ident: &Identification) -> Vec<String> {
        let entry = &ident.entry;
        match self {
            StrategyKind::System => vec![non_empty_or(&entry.system, "Unknown")],
            StrategyKind::Region => vec![non_empty_or(&entry.region, "Unknown")],
            StrategyKind::Alphabetical => {
                let bucket = entry
                    .game_name
                    .chars()
                    .next()
                    .filter(|c| c.is_alphabetic())
                    .map(|c| c.to_uppercase().to_string())
                    .unwrap_or_else(|| "#".to_string());
                vec![bucket]
            }
            StrategyKind::EmulationStation => {
                vec!["roms".to_string(), emulationstation_folder(&entry.system)]
            }
            StrategyKind::OneGameOneRom | StrategyKind::Flat => Vec::new(),
        }
    }
}

fn non_empty_or(value: &str, fallback: &str) -> String {
    if value.trim().is_empty() {
        fallback.to_string()
    } else {
        value.to_string()
    }
}

/// A strategy or a `+`-joined composition, e.g. `system+region`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Strategy {
    parts: Vec<StrategyKind>,
}

impl FromStr for Strategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts = s
            .split('+')
            .map(|part| {
                StrategyKind::from_id(part)
                    .ok_or_else(|| Error::UnknownStrategy(part.trim().to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Strategy { parts })
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ids: Vec<&str> = self.parts.iter().map(StrategyKind::id).collect();
        f.write_str(&ids.join("+"))
    }
}

impl From<StrategyKind> for Strategy {
    fn from(kind: StrategyKind) -> Self {
        Strategy { parts: vec![kind] }
    }
}

impl Strategy {
    pub fn id(&self) -> String {
        self.to_string()
    }

    pub fn parts(&self) -> &[StrategyKind] {
        &self.parts
    }

    pub fn describe(&self) -> String {
        let parts: Vec<&str> = self.parts.iter().map(StrategyKind::describe).collect();
        parts.join(", then ")
    }

    /// Directory levels for one identified file, in composition order.
    pub fn directories(&self, ident: &Identification) -> Vec<String> {
        self.parts
            .iter()
            .flat_map(|part| part.directories(ident))
            .collect()
    }

    /// Narrow the identified set. Only `1g1r` drops anything.
    pub fn select<'a>(
        &self,
        identified: &'a [Identification],
        region_priority: &[String],
    ) -> Vec<&'a Identification> {
        if self.parts.contains(&StrategyKind::OneGameOneRom) {
            one_game_one_rom(identified, region_priority)
        } else {
            identified.iter().collect()
        }
    }
}

fn region_rank(region: &str, priority: &[String]) -> usize {
    if region.is_empty() {
        // Unknown sorts after every listed region but before unlisted ones.
        return priority.len();
    }
    priority
        .iter()
        .position(|p| p.eq_ignore_ascii_case(region))
        .unwrap_or(priority.len() + 1)
}

/// Keep one variant per game: best region, then latest revision, then file
/// name. Game identity is the tag-stripped name within one system. Every
/// file of the chosen variant is kept.
pub fn one_game_one_rom<'a>(
    identified: &'a [Identification],
    region_priority: &[String],
) -> Vec<&'a Identification> {
    let mut games: BTreeMap<(String, String), Vec<&'a Identification>> = BTreeMap::new();
    for ident in identified {
        let key = (ident.entry.system.clone(), base_name(&ident.entry.game_name));
        games.entry(key).or_default().push(ident);
    }

    let mut selected = Vec::new();
    for variants in games.values() {
        let best = variants.iter().min_by_key(|i| {
            (
                region_rank(&i.entry.region, region_priority),
                Reverse(Revision::parse(&i.entry.game_name)),
                i.descriptor.file_name(),
                i.entry.game_name.clone(),
            )
        });
        let Some(best) = best else {
            continue;
        };
        selected.extend(
            variants
                .iter()
                .copied()
                .filter(|i| {
                    i.entry.game_name == best.entry.game_name && i.catalog_id == best.catalog_id
                }),
        );
    }
    selected
}
