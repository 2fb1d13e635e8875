//! Transcript export for a single conversation.
//!
//! A thread is written as TXT, CSV or JSON with the partner's phone number
//! replaced by the contact's display name.

use crate::error::Result;
use crate::models::{Message, OutputFormat, SELF_IDENTIFIER};
use csv::Writer;
use std::fs::{create_dir_all, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

const TIMESTAMP_FORMAT: &str = "%b %d, %Y %r";

/// Display names used when writing a thread
#[derive(Debug, Clone, Copy)]
pub struct ThreadNames<'a> {
    /// Conversation partner's phone number as stored on messages
    pub phone_number: &'a str,
    /// Name shown in place of the phone number
    pub display_name: &'a str,
}

impl ThreadNames<'_> {
    fn sender<'m>(&'m self, message: &'m Message) -> &'m str {
        if message.sender == SELF_IDENTIFIER {
            SELF_IDENTIFIER
        } else if message.sender == self.phone_number {
            self.display_name
        } else {
            &message.sender
        }
    }
}

fn timestamp(message: &Message) -> String {
    message
        .datetime
        .or(message.nkdatetime)
        .map(|dt| dt.format(TIMESTAMP_FORMAT).to_string())
        .unwrap_or_default()
}

/// File name for a thread export: the display name with unsafe characters
/// replaced, plus the format's extension.
#[must_use]
pub fn thread_file_name(names: &ThreadNames<'_>, format: OutputFormat) -> String {
    let stem: String = names
        .display_name
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '+' { c } else { '_' })
        .collect();
    let stem = if stem.trim_matches('_').is_empty() {
        "thread".to_string()
    } else {
        stem
    };
    format!("{stem}.{}", format.extension())
}

/// Write a thread into `output_dir`, creating it if needed.
///
/// Returns the path of the written file.
pub fn write_thread_to_dir(
    messages: &[Message],
    names: &ThreadNames<'_>,
    format: OutputFormat,
    output_dir: &Path,
) -> Result<PathBuf> {
    create_dir_all(output_dir)?;
    let file_path = output_dir.join(thread_file_name(names, format));
    write_thread_to_file(messages, names, format, &file_path)?;
    Ok(file_path)
}

/// Write a thread to a file in the specified format.
///
/// # Errors
///
/// Returns an error if file creation or writing fails.
pub fn write_thread_to_file(
    messages: &[Message],
    names: &ThreadNames<'_>,
    format: OutputFormat,
    file_path: &Path,
) -> Result<()> {
    if let Some(parent) = file_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        create_dir_all(parent)?;
    }
    let file = File::create(file_path)?;
    write_thread(messages, names, format, file)
}

/// Write a thread to any writer
pub fn write_thread<W: Write>(
    messages: &[Message],
    names: &ThreadNames<'_>,
    format: OutputFormat,
    writer: W,
) -> Result<()> {
    match format {
        OutputFormat::Txt => write_txt(messages, names, writer),
        OutputFormat::Csv => write_csv(messages, names, writer),
        OutputFormat::Json => write_json(messages, names, writer),
    }
}

/// Format: `sender, timestamp, text\n\n` (blank line between messages)
fn write_txt<W: Write>(messages: &[Message], names: &ThreadNames<'_>, writer: W) -> Result<()> {
    let mut writer = BufWriter::new(writer);

    for message in messages {
        writeln!(
            writer,
            "{}, {}, {}",
            names.sender(message),
            timestamp(message),
            message.message
        )?;
        writeln!(writer)?;
    }

    writer.flush()?;
    Ok(())
}

/// Header row: `ID, Sender, Datetime, Message`
fn write_csv<W: Write>(messages: &[Message], names: &ThreadNames<'_>, writer: W) -> Result<()> {
    let mut writer = Writer::from_writer(writer);

    writer.write_record(["ID", "Sender", "Datetime", "Message"])?;

    for (i, message) in messages.iter().enumerate() {
        writer.write_record([
            (i + 1).to_string().as_str(),
            names.sender(message),
            timestamp(message).as_str(),
            message.message.as_str(),
        ])?;
    }

    writer.flush()?;
    Ok(())
}

fn write_json<W: Write>(messages: &[Message], names: &ThreadNames<'_>, writer: W) -> Result<()> {
    let writer = BufWriter::new(writer);

    let json_messages: Vec<serde_json::Value> = messages
        .iter()
        .map(|m| {
            serde_json::json!({
                "id": m.id,
                "sender": names.sender(m),
                "timestamp": timestamp(m),
                "type": m.direction,
                "message": m.message,
            })
        })
        .collect();

    serde_json::to_writer_pretty(writer, &json_messages)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Direction;

    #[test]
    fn test_thread_file_name_replaces_separators() {
        let names = ThreadNames {
            phone_number: "+1555",
            display_name: "Ann / Bob",
        };
        assert_eq!(thread_file_name(&names, OutputFormat::Csv), "Ann___Bob.csv");

        let blank = ThreadNames {
            phone_number: "+1555",
            display_name: "  ",
        };
        assert_eq!(thread_file_name(&blank, OutputFormat::Txt), "thread.txt");
    }

    #[test]
    fn test_txt_resolves_display_name() {
        let names = ThreadNames {
            phone_number: "+1555",
            display_name: "Ann",
        };
        let incoming = Message::new("hi", "+1555", None, None, None, Direction::Incoming);
        let outgoing = Message::new("yo", "+1555", None, None, None, Direction::Outgoing);

        let mut out = Vec::new();
        write_thread(&[incoming, outgoing], &names, OutputFormat::Txt, &mut out).expect("write");
        let text = String::from_utf8(out).expect("utf8");
        assert_eq!(text, "Ann, , hi\n\nMe, , yo\n\n");
    }
}
