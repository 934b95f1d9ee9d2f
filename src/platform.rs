//! Platform detection and release asset selection.
//!
//! Upstream projects name their release archives inconsistently, so the
//! selector runs each asset through an ordered list of scoring functions of
//! decreasing precision. The best asset is the minimum of
//! `(tier, extension rank, sub-rank, asset index)`, which makes the choice
//! deterministic for identical inputs.

use crate::types::{Asset, PlatformInfo};
use regex::Regex;

pub const ARCH_ALIASES: &[(&str, &[&str])] = &[
    ("x86_64", &["x86_64", "amd64", "x64"]),
    ("aarch64", &["aarch64", "arm64", "aarch_64"]),
    ("arm", &["arm", "armv7"]),
];

pub const PLATFORM_ALIASES: &[(&str, &[&str])] = &[
    (
        "linux",
        &[
            "linux",
            "unknown-linux",
            "unknown-linux-gnu",
            "unknown-linux-musl",
        ],
    ),
    ("darwin", &["darwin", "apple-darwin", "macos", "osx"]),
    ("windows", &["windows", "pc-windows", "pc-windows-msvc"]),
];

/// Preferred archive extensions, most preferred first.
const ARCHIVE_EXTENSIONS: &[&str] = &[".tar.gz", ".tgz", ".appimage", ".zip"];
const ARCHIVE_EXT_PATTERN: &str = r"\.(?:tar\.gz|tgz|appimage|zip)$";

const EXCLUDED_SUFFIXES: &[&str] = &[
    ".sha256", ".sha512", ".sha1", ".md5", ".sig", ".asc", ".pem", ".zsync",
];
const EXCLUDED_NAMES: &[&str] = &[
    "checksums.txt",
    "sha256sums",
    "sha256sums.txt",
    "sha512sums",
    "sha512sums.txt",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MatchTier {
    Exact,
    Pattern,
    Contains,
    Fallback,
}

/// Map any known alias to its canonical name, or return the input lowercased.
fn canonicalize(value: &str, table: &[(&str, &[&str])]) -> String {
    let value = value.trim().to_lowercase();
    table
        .iter()
        .find(|(canonical, aliases)| *canonical == value || aliases.contains(&value.as_str()))
        .map(|(canonical, _)| canonical.to_string())
        .unwrap_or(value)
}

pub fn canonical_arch(arch: &str) -> String {
    canonicalize(arch, ARCH_ALIASES)
}

pub fn canonical_platform(platform: &str) -> String {
    let platform = platform.trim().to_lowercase();
    match platform.as_str() {
        "macos" | "mac" => "darwin".to_string(),
        _ => canonicalize(&platform, PLATFORM_ALIASES),
    }
}

fn aliases_for(canonical: &str, table: &[(&str, &[&str])]) -> Vec<String> {
    table
        .iter()
        .find(|(name, _)| *name == canonical)
        .map(|(_, aliases)| aliases.iter().map(|a| a.to_string()).collect())
        .unwrap_or_else(|| vec![canonical.to_string()])
}

pub fn detect_platform() -> PlatformInfo {
    let info = PlatformInfo {
        platform: canonical_platform(std::env::consts::OS),
        arch: canonical_arch(std::env::consts::ARCH),
    };
    tracing::debug!("Detected platform {} / {}", info.platform, info.arch);
    info
}

/// Build the target from optional CLI overrides, detecting whatever is unset.
pub fn resolve_target(platform: Option<&str>, arch: Option<&str>) -> PlatformInfo {
    let detected = detect_platform();
    PlatformInfo {
        platform: platform.map(canonical_platform).unwrap_or(detected.platform),
        arch: arch.map(canonical_arch).unwrap_or(detected.arch),
    }
}

/// Signature, checksum and patch companions are never installable.
pub fn is_excluded(name: &str) -> bool {
    let name = name.to_lowercase();
    EXCLUDED_NAMES.contains(&name.as_str())
        || EXCLUDED_SUFFIXES.iter().any(|suffix| name.ends_with(suffix))
}

pub fn extension_rank(name: &str) -> usize {
    let name = name.to_lowercase();
    ARCHIVE_EXTENSIONS
        .iter()
        .position(|ext| name.ends_with(ext))
        .unwrap_or(ARCHIVE_EXTENSIONS.len())
}

type Scorer = fn(&Selector, &str) -> Option<usize>;

/// Scoring functions in tier order. Each returns the sub-rank of a match.
const SCORERS: &[(MatchTier, Scorer)] = &[
    (MatchTier::Exact, Selector::score_exact),
    (MatchTier::Pattern, Selector::score_pattern),
    (MatchTier::Contains, Selector::score_contains),
    (MatchTier::Fallback, Selector::score_fallback),
];

struct Selector {
    repo: String,
    arch: String,
    platform: String,
    arch_aliases: Vec<String>,
    platform_aliases: Vec<String>,
    templates: Vec<Regex>,
}

impl Selector {
    fn new(repo_short: &str, target: &PlatformInfo) -> Self {
        let repo = repo_short.to_lowercase();
        let arch = target.arch.to_lowercase();
        let platform = target.platform.to_lowercase();
        let arch_aliases = aliases_for(&arch, ARCH_ALIASES);
        let platform_aliases = aliases_for(&platform, PLATFORM_ALIASES);

        let (r, a, p) = (
            regex::escape(&repo),
            regex::escape(&arch),
            regex::escape(&platform),
        );
        let mut templates = vec![
            format!("{r}.*{a}.*{p}"),
            format!("{r}.*{p}.*{a}"),
            format!("{a}-.*{p}"),
            format!("{p}-.*{a}"),
            format!("{a}.*{p}"),
            format!("{p}.*{a}"),
        ];
        templates.extend(
            platform_aliases
                .iter()
                .map(|variant| format!("{a}.*{}", regex::escape(variant))),
        );
        if arch.contains("64") {
            templates.push(format!("{p}.*64"));
        }
        templates.push(p.clone());

        let templates = templates
            .into_iter()
            .filter_map(|t| Regex::new(&format!("^.*{}.*{}", t, ARCHIVE_EXT_PATTERN)).ok())
            .collect();

        Self {
            repo,
            arch,
            platform,
            arch_aliases,
            platform_aliases,
            templates,
        }
    }

    /// An arch alias joined to a platform alias, or the repo name with both.
    fn score_exact(&self, name: &str) -> Option<usize> {
        let adjacent = self.arch_aliases.iter().any(|a| {
            self.platform_aliases.iter().any(|p| {
                ['-', '_'].iter().any(|sep| {
                    name.contains(&format!("{a}{sep}{p}")) || name.contains(&format!("{p}{sep}{a}"))
                })
            })
        });
        if adjacent {
            return Some(0);
        }

        let repo_specific = !self.repo.is_empty()
            && name.contains(&self.repo)
            && self.arch_aliases.iter().any(|a| name.contains(a.as_str()))
            && self.platform_aliases.iter().any(|p| name.contains(p.as_str()));
        repo_specific.then_some(1)
    }

    fn score_pattern(&self, name: &str) -> Option<usize> {
        self.templates.iter().position(|t| t.is_match(name))
    }

    /// A joined `platform_arch`/`platform-arch` token ranks ahead of the two
    /// strings appearing anywhere.
    fn score_contains(&self, name: &str) -> Option<usize> {
        let joined_underscore = format!("{}_{}", self.platform, self.arch);
        let joined_dash = format!("{}-{}", self.platform, self.arch);
        if name.contains(&joined_underscore) || name.contains(&joined_dash) {
            return Some(0);
        }
        (name.contains(&self.arch) && name.contains(&self.platform)).then_some(1)
    }

    fn score_fallback(&self, name: &str) -> Option<usize> {
        (extension_rank(name) < ARCHIVE_EXTENSIONS.len()).then_some(0)
    }

    fn score(&self, name: &str) -> Option<(MatchTier, usize)> {
        SCORERS
            .iter()
            .find_map(|(tier, scorer)| scorer(self, name).map(|sub_rank| (*tier, sub_rank)))
    }
}

/// Pick the asset to install for `target`, or `None` if nothing fits.
pub fn select_asset<'a>(
    repo_short: &str,
    assets: &'a [Asset],
    target: &PlatformInfo,
) -> Option<&'a Asset> {
    tracing::trace!(
        "Looking for assets matching platform '{}', arch '{}'",
        target.platform,
        target.arch
    );
    let selector = Selector::new(repo_short, target);

    let best = assets
        .iter()
        .enumerate()
        .filter(|(_, asset)| !is_excluded(&asset.name))
        .filter_map(|(index, asset)| {
            let name = asset.name.to_lowercase();
            let (tier, sub_rank) = selector.score(&name)?;
            tracing::trace!("Asset '{}': {:?} (sub-rank {})", asset.name, tier, sub_rank);
            Some(((tier, extension_rank(&name), sub_rank, index), asset))
        })
        .min_by_key(|(key, _)| *key);

    match best {
        Some(((tier, ..), asset)) => {
            tracing::info!("Selected asset '{}' ({:?} match)", asset.name, tier);
            Some(asset)
        }
        None => {
            tracing::debug!("No suitable asset among {} candidates", assets.len());
            None
        }
    }
}
