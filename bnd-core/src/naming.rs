//! Naming grammar for sessions, recordings, probes and videos.
//!
//! Pure string transforms, no filesystem access. This is the only place that
//! knows about the date format; everything else treats names as opaque,
//! already-validated tokens.
//!
//! | Entity           | Pattern                                   |
//! |------------------|-------------------------------------------|
//! | session folder   | `{subject}_{YYYY}_{MM}_{DD}_{HH}_{mm}`    |
//! | recording folder | `{session}_g{N}`                          |
//! | probe folder     | `{recording}_imec{d}`                     |
//! | probe data file  | `{recording}_t0.imec{d}.{lf,ap}.{meta,bin}` |
//! | video folder     | `{session}_cameras`                       |
//! | video file       | `{session}_camera_{id}{ext}`              |

use chrono::NaiveDateTime;

use crate::error::NamingError;

/// `strftime` format of the timestamp part of a session name.
pub const SESSION_DATE_FORMAT: &str = "%Y_%m_%d_%H_%M";

/// Suffixes of the four raw data files every probe folder holds.
pub const PROBE_DATA_SUFFIXES: [&str; 4] = [".lf.meta", ".lf.bin", ".ap.meta", ".ap.bin"];

const RECORDING_MARKER: &str = "_g";
const PROBE_MARKER: &str = "_imec";
const VIDEO_FOLDER_SUFFIX: &str = "_cameras";
const VIDEO_FILE_INFIX: &str = "_camera_";

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

/// `{subject}_{YYYY}_{MM}_{DD}_{HH}_{mm}`
pub fn format_session(subject: &str, timestamp: NaiveDateTime) -> String {
    format!("{subject}_{}", timestamp.format(SESSION_DATE_FORMAT))
}

/// Parse a session folder name for `subject`, returning its timestamp.
///
/// Fails unless the suffix after `subject_` round-trips exactly through
/// [`format_session`]; parseable but non-canonical names (e.g. missing zero
/// padding) are rejected.
pub fn parse_session(name: &str, subject: &str) -> Result<NaiveDateTime, NamingError> {
    let rest = strip_prefix_with_separator(name, subject)?;

    let timestamp = NaiveDateTime::parse_from_str(rest, SESSION_DATE_FORMAT).map_err(|_| {
        NamingError::BadTimestamp {
            name: name.to_owned(),
            value: rest.to_owned(),
            format: SESSION_DATE_FORMAT,
        }
    })?;

    let canonical = timestamp.format(SESSION_DATE_FORMAT).to_string();
    if canonical != rest {
        return Err(NamingError::NonCanonical {
            name: name.to_owned(),
            value: rest.to_owned(),
            canonical,
        });
    }
    Ok(timestamp)
}

// ---------------------------------------------------------------------------
// Recordings and probes
// ---------------------------------------------------------------------------

/// `{session}_g{N}`
pub fn format_recording(session: &str, index: u32) -> String {
    format!("{session}{RECORDING_MARKER}{index}")
}

/// Parse a recording folder name of `session`, returning its index.
pub fn parse_recording(name: &str, session: &str) -> Result<u32, NamingError> {
    let expected = format!("{session}{RECORDING_MARKER}<N>");
    let index = parse_numbered_suffix(name, session, RECORDING_MARKER, "recording", &expected)?;
    u32::try_from(index).map_err(|_| NamingError::BadSuffix {
        name: name.to_owned(),
        entity: "recording",
        expected,
    })
}

/// `{recording}_imec{d}`
pub fn format_probe_folder(recording: &str, probe: u8) -> String {
    format!("{recording}{PROBE_MARKER}{probe}")
}

/// Parse a probe folder name of `recording`, returning its single-digit index.
pub fn parse_probe_folder(name: &str, recording: &str) -> Result<u8, NamingError> {
    let expected = format!("{recording}{PROBE_MARKER}<d>");
    let index = parse_numbered_suffix(name, recording, PROBE_MARKER, "probe", &expected)?;
    if index > 9 {
        return Err(NamingError::BadSuffix {
            name: name.to_owned(),
            entity: "probe",
            expected,
        });
    }
    Ok(index as u8)
}

/// The four data files a probe folder must contain, in a fixed order.
pub fn probe_data_files(recording: &str, probe: u8) -> [String; 4] {
    PROBE_DATA_SUFFIXES.map(|suffix| format!("{recording}_t0.imec{probe}{suffix}"))
}

/// Whether `file_name` carries one of the raw probe data suffixes.
pub fn is_probe_data_file(file_name: &str) -> bool {
    PROBE_DATA_SUFFIXES
        .iter()
        .any(|suffix| file_name.ends_with(suffix))
}

// ---------------------------------------------------------------------------
// Videos and extra files
// ---------------------------------------------------------------------------

/// `{session}_cameras`
pub fn video_folder(session: &str) -> String {
    format!("{session}{VIDEO_FOLDER_SUFFIX}")
}

/// `{session}_camera_`, the prefix every video file must start with.
pub fn video_file_prefix(session: &str) -> String {
    format!("{session}{VIDEO_FILE_INFIX}")
}

/// `{session}_camera_{id}{extension}`
pub fn video_file(session: &str, camera_id: u32, extension: &str) -> String {
    format!("{session}{VIDEO_FILE_INFIX}{camera_id}{extension}")
}

/// Trailing numeric camera id of a loosely-named video file stem, e.g.
/// `Camera_0` → `0`, `M011_2023_04_04_16_00_camera_3` → `3`.
pub fn camera_id_from_stem(stem: &str) -> Option<u32> {
    stem.rsplit('_').next().and_then(|id| id.parse().ok())
}

/// `{session}_{file_name}`
pub fn prefix_with_session(session: &str, file_name: &str) -> String {
    format!("{session}_{file_name}")
}

/// Whether a filename is hidden (starts with a dot).
pub fn is_hidden(file_name: &str) -> bool {
    file_name.starts_with('.')
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn strip_prefix_with_separator<'a>(name: &'a str, prefix: &str) -> Result<&'a str, NamingError> {
    let Some(rest) = name.strip_prefix(prefix) else {
        return Err(NamingError::MissingPrefix {
            name: name.to_owned(),
            prefix: prefix.to_owned(),
        });
    };
    rest.strip_prefix('_')
        .ok_or_else(|| NamingError::MissingSeparator {
            name: name.to_owned(),
            prefix: prefix.to_owned(),
        })
}

/// Parse `{parent}{marker}{digits}` where the digits are canonical (no sign,
/// no leading zeros except for `0` itself).
fn parse_numbered_suffix(
    name: &str,
    parent: &str,
    marker: &str,
    entity: &'static str,
    expected: &str,
) -> Result<u64, NamingError> {
    let bad = || NamingError::BadSuffix {
        name: name.to_owned(),
        entity,
        expected: expected.to_owned(),
    };

    let Some(rest) = name.strip_prefix(parent) else {
        return Err(NamingError::MissingPrefix {
            name: name.to_owned(),
            prefix: parent.to_owned(),
        });
    };
    let digits = rest.strip_prefix(marker).ok_or_else(bad)?;
    if digits.is_empty()
        || !digits.bytes().all(|b| b.is_ascii_digit())
        || (digits.len() > 1 && digits.starts_with('0'))
    {
        return Err(bad());
    }
    digits.parse().map_err(|_| bad())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
