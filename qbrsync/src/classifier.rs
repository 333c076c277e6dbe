//! Primary tag classification for alerts.
//!
//! An alert carries free-form routing tags. The dashboard wants exactly one category per alert,
//! picked by scanning the tags in their original order and, within each tag, the substring table
//! below in order. The first hit anywhere wins. Table order matters: `aps` must be tried before
//! `-ap`, and `server` after everything more specific that may also contain it.

/// Category for an alert tagged exactly `catchall` that matches nothing else.
pub const CATCH_ALL: &str = "Catch-all";

/// Category for an alert that matches nothing at all.
pub const MISC: &str = "Misc.";

const CATCH_ALL_MARKER: &str = "catchall";

/// (lower-case substring, category), consulted first to last.
const PRIMARY_TAG_TABLE: &[(&str, &str)] = &[
    ("hotline", "Hotline"),
    ("vcenters", "vCenter"),
    ("aps", "AP"),
    ("-ap", "AP"),
    ("hosts", "Host"),
    ("data protection advisor", "Data Protection Advisor"),
    ("ucs", "UCS"),
    ("probe device", "Probe Device"),
    ("snow", "ServiceNow"),
    ("contactcenter", "Contact Center"),
    ("virtualization", "Virtualization"),
    ("repl", "Replication"),
    ("storage", "Storage"),
    ("-fabric", "Fabric"),
    ("bkup", "Backup"),
    ("network", "Network"),
    ("-sw", "Switch"),
    ("fw", "Firewall"),
    ("server", "Server"),
    ("hardware", "Hardware"),
];

/// Pick the single category for a set of raw alert tags.
///
/// A literal `catchall` tag only sets the fallback; any substring match on any tag still wins.
pub fn primary_tag<S: AsRef<str>>(tags: &[S]) -> &'static str {
    let lowered: Vec<String> = tags.iter().map(|tag| tag.as_ref().to_lowercase()).collect();

    let fallback = if lowered.iter().any(|tag| tag == CATCH_ALL_MARKER) {
        CATCH_ALL
    } else {
        MISC
    };

    lowered
        .iter()
        .find_map(|tag| {
            PRIMARY_TAG_TABLE
                .iter()
                .find(|(needle, _)| tag.contains(*needle))
                .map(|(_, category)| *category)
        })
        .unwrap_or(fallback)
}
