//! VMG decoder.
//!
//! A VMG file is a vCard header followed by an envelope holding the message
//! body:
//!
//! ```text
//! X-NOK-DT:20231215T143025Z
//! BEGIN:VCARD
//! TEL:+1234567890
//! END:VCARD
//! BEGIN:VENV
//! BEGIN:VBODY
//! Date:15.12.2023 14:30:25
//! Hello
//! END:VBODY
//! ```
//!
//! The decoder walks the text line by line through a small state machine:
//! it finds the device clock field, then the first `TEL:` line that is
//! immediately followed by `END:VCARD`, `BEGIN:VENV`, `BEGIN:VBODY` and a
//! `Date:` line, then collects the body up to the nearest `END:VBODY`.
//! Lines may end in `\n` or `\r\n`; line breaks inside the body are kept.

use chrono::{NaiveDate, NaiveDateTime};
use tracing::debug;

use crate::error::{Result, VmgError};
use crate::models::{Direction, Message};

const DEVICE_CLOCK_FIELD: &str = "X-NOK-DT:";
const TEL_FIELD: &str = "TEL:";
const DATE_FIELD: &str = "Date:";
const END_VCARD: &str = "END:VCARD";
const BEGIN_VENV: &str = "BEGIN:VENV";
const BEGIN_VBODY: &str = "BEGIN:VBODY";
const END_VBODY: &str = "END:VBODY";

/// One physical line: `content` has the terminator stripped, `raw` keeps it.
#[derive(Debug, Clone, Copy)]
struct Line<'a> {
    content: &'a str,
    raw: &'a str,
}

fn split_lines(text: &str) -> Vec<Line<'_>> {
    text.split_inclusive('\n')
        .map(|raw| {
            let content = raw
                .strip_suffix('\n')
                .map_or(raw, |line| line.strip_suffix('\r').unwrap_or(line));
            Line { content, raw }
        })
        .collect()
}

/// Value of `field` on this line, if the line carries it with a non-empty value
fn field_value<'a>(line: &Line<'a>, field: &str) -> Option<&'a str> {
    line.content.strip_prefix(field).filter(|value| !value.is_empty())
}

#[derive(Debug, Clone, Copy)]
enum State<'a> {
    /// Looking for the device clock field
    Header,
    /// Looking for a `TEL:` line
    Card { clock: &'a str },
    /// Saw `TEL:`, expecting the fixed marker sequence
    Envelope {
        clock: &'a str,
        phone: &'a str,
        expect: &'static str,
    },
    /// Saw `BEGIN:VBODY`, expecting `Date:`
    BodyDate { clock: &'a str, phone: &'a str },
    /// Collecting message text
    Body {
        clock: &'a str,
        phone: &'a str,
        date: &'a str,
        start: usize,
    },
}

/// Raw field values located by the state machine
#[derive(Debug, Clone, PartialEq, Eq)]
struct Fields<'a> {
    clock: &'a str,
    phone: &'a str,
    date: &'a str,
    text: String,
}

fn next_marker(current: &str) -> Option<&'static str> {
    match current {
        END_VCARD => Some(BEGIN_VENV),
        BEGIN_VENV => Some(BEGIN_VBODY),
        _ => None,
    }
}

fn scan(text: &str) -> std::result::Result<Fields<'_>, String> {
    let lines = split_lines(text);
    let mut state = State::Header;
    let mut last_mismatch: Option<String> = None;
    let mut index = 0;

    while index < lines.len() {
        let line = lines[index];
        match state {
            State::Header => {
                if let Some(clock) = field_value(&line, DEVICE_CLOCK_FIELD) {
                    state = State::Card { clock };
                }
            }
            State::Card { clock } => {
                if let Some(phone) = field_value(&line, TEL_FIELD) {
                    state = State::Envelope {
                        clock,
                        phone,
                        expect: END_VCARD,
                    };
                }
            }
            State::Envelope { clock, phone, expect } => {
                if line.content == expect {
                    state = match next_marker(expect) {
                        Some(next) => State::Envelope {
                            clock,
                            phone,
                            expect: next,
                        },
                        None => State::BodyDate { clock, phone },
                    };
                } else {
                    last_mismatch = Some(format!("expected {expect} on line {}", index + 1));
                    // The mismatching line may itself be another TEL: line.
                    state = State::Card { clock };
                    continue;
                }
            }
            State::BodyDate { clock, phone } => {
                if let Some(date) = field_value(&line, DATE_FIELD) {
                    state = State::Body {
                        clock,
                        phone,
                        date,
                        start: index + 1,
                    };
                } else {
                    last_mismatch = Some(format!("expected {DATE_FIELD} on line {}", index + 1));
                    state = State::Card { clock };
                    continue;
                }
            }
            State::Body {
                clock,
                phone,
                date,
                start,
            } => {
                if line.content.starts_with(END_VBODY) {
                    // The text must sit on its own line between `Date:` and `END:VBODY`.
                    if index == start {
                        return Err(format!("empty message body before {END_VBODY} on line {}", index + 1));
                    }
                    let body: String = lines[start..index].iter().map(|l| l.raw).collect();
                    let text = strip_line_break(&body).to_string();
                    return Ok(Fields {
                        clock,
                        phone,
                        date,
                        text,
                    });
                }
            }
        }
        index += 1;
    }

    Err(match state {
        State::Header => format!("missing {DEVICE_CLOCK_FIELD} device clock field"),
        State::Card { .. } | State::Envelope { .. } | State::BodyDate { .. } => last_mismatch
            .unwrap_or_else(|| format!("missing {TEL_FIELD} field followed by the message envelope")),
        State::Body { .. } => format!("missing {END_VBODY} marker"),
    })
}

fn strip_line_break(text: &str) -> &str {
    text.strip_suffix('\n')
        .map_or(text, |rest| rest.strip_suffix('\r').unwrap_or(rest))
}

fn digits(value: &str) -> Option<u32> {
    let value = value.trim();
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    value.parse().ok()
}

fn build_datetime(year: u32, month: u32, day: u32, hour: u32, minute: u32, second: u32) -> Option<NaiveDateTime> {
    // Source months are 1-based, which is what chrono expects.
    NaiveDate::from_ymd_opt(i32::try_from(year).ok()?, month, day)?.and_hms_opt(hour, minute, second)
}

/// Parse the `X-NOK-DT` value (`YYYYMMDD?HHMMSS...`) by fixed character offsets.
///
/// Offset 8 holds a separator (usually `T`) and is ignored, as is anything
/// after offset 15 (usually a `Z`).
#[must_use]
pub fn parse_device_clock(value: &str) -> Option<NaiveDateTime> {
    let slice = |from: usize, to: usize| value.get(from..to).and_then(digits);
    build_datetime(
        slice(0, 4)?,
        slice(4, 6)?,
        slice(6, 8)?,
        slice(9, 11)?,
        slice(11, 13)?,
        slice(13, 15)?,
    )
}

/// Parse the body `Date:` value (`DD.MM.YYYY HH:MM:SS`).
#[must_use]
pub fn parse_body_date(value: &str) -> Option<NaiveDateTime> {
    let mut halves = value.split_whitespace();
    let date_part = halves.next()?;
    let time_part = halves.next()?;

    let mut date = date_part.split('.');
    let day = digits(date.next()?)?;
    let month = digits(date.next()?)?;
    let year = digits(date.next()?)?;

    let mut time = time_part.split(':');
    let hour = digits(time.next()?)?;
    let minute = digits(time.next()?)?;
    let second = digits(time.next()?)?;

    build_datetime(year, month, day, hour, minute, second)
}

/// Decode raw VMG text into an unsaved [`Message`].
///
/// `direction` decides which side the extracted phone number lands on:
/// incoming messages are sent by that number to [`crate::models::SELF_IDENTIFIER`],
/// outgoing ones the other way round.
///
/// # Errors
///
/// Returns [`VmgError::Parse`] naming `filename` when the structure is absent
/// or a timestamp field cannot be read. No partial message is produced.
pub fn parse(raw: &str, filename: &str, direction: Direction) -> Result<Message> {
    let fields = scan(raw).map_err(|reason| VmgError::parse(filename, reason))?;

    let nkdatetime = parse_device_clock(fields.clock).ok_or_else(|| {
        VmgError::parse(filename, format!("invalid {DEVICE_CLOCK_FIELD} value `{}`", fields.clock))
    })?;
    let datetime = parse_body_date(fields.date).ok_or_else(|| {
        VmgError::parse(filename, format!("invalid {DATE_FIELD} value `{}`", fields.date))
    })?;

    let filename = (!filename.is_empty()).then(|| filename.to_string());
    let message = Message::new(
        fields.text,
        fields.phone,
        Some(datetime),
        Some(nkdatetime),
        filename,
        direction,
    );

    debug!(
        filename = message.filename.as_deref().unwrap_or(""),
        partner = message.partner(),
        direction = %direction,
        "Decoded VMG message"
    );

    Ok(message)
}
