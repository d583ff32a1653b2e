use laura_frame::{Channel, Reassembler};
use laura_link::{decode_message, DecodedEvent};
use serde::Serialize;

use crate::cmd::DecodeArgs;
use crate::exit::{hex_error, CliResult, SUCCESS};
use crate::output::{event_summary, print_json, table, OutputFormat};

#[derive(Debug, Serialize)]
struct DroppedFragment {
    index: usize,
    error: String,
}

#[derive(Debug, Serialize)]
struct DecodeOutput {
    channel: &'static str,
    fragments: usize,
    events: Vec<DecodedEvent>,
    /// Complete messages the decoder could not interpret.
    undecodable: usize,
    dropped: Vec<DroppedFragment>,
    /// Bytes of a message still waiting for continuations.
    pending_bytes: Option<usize>,
}

pub fn run(args: DecodeArgs, format: OutputFormat) -> CliResult<i32> {
    let fragments = args
        .fragments
        .iter()
        .enumerate()
        .map(|(index, text)| {
            hex::decode(text.trim()).map_err(|err| hex_error(&format!("fragment {index}"), err))
        })
        .collect::<CliResult<Vec<_>>>()?;

    let output = reassemble(args.channel, &fragments);
    print_decode(&output, format);
    Ok(SUCCESS)
}

fn reassemble(channel: Channel, fragments: &[Vec<u8>]) -> DecodeOutput {
    let mut reassembler = Reassembler::new();
    let mut output = DecodeOutput {
        channel: channel.name(),
        fragments: fragments.len(),
        events: Vec::new(),
        undecodable: 0,
        dropped: Vec::new(),
        pending_bytes: None,
    };

    for (index, fragment) in fragments.iter().enumerate() {
        match reassembler.submit(channel, fragment) {
            Ok(true) => {
                let Some(message) = reassembler.take_message(channel) else {
                    continue;
                };
                match decode_message(channel, &message) {
                    Some(event) => output.events.push(event),
                    None => output.undecodable += 1,
                }
            }
            Ok(false) => {}
            Err(err) => output.dropped.push(DroppedFragment {
                index,
                error: err.to_string(),
            }),
        }
    }

    output.pending_bytes = reassembler
        .buffer(channel)
        .filter(|buffer| buffer.in_progress())
        .map(|buffer| buffer.buffered_len());
    output
}

fn print_decode(output: &DecodeOutput, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(output),
        OutputFormat::Table => {
            let mut out = table(&["EVENT", "DETAIL"]);
            for event in &output.events {
                out.add_row(vec![event.kind().to_string(), event_summary(event)]);
            }
            for dropped in &output.dropped {
                out.add_row(vec![
                    format!("dropped #{}", dropped.index),
                    dropped.error.clone(),
                ]);
            }
            if let Some(pending) = output.pending_bytes {
                out.add_row(vec!["incomplete".to_string(), format!("{pending} bytes buffered")]);
            }
            println!("{out}");
        }
        OutputFormat::Pretty => {
            for event in &output.events {
                println!("[{}] {}: {}", output.channel, event.kind(), event_summary(event));
            }
            for dropped in &output.dropped {
                println!("[{}] fragment {} dropped: {}", output.channel, dropped.index, dropped.error);
            }
            if let Some(pending) = output.pending_bytes {
                println!("[{}] incomplete message, {pending} bytes buffered", output.channel);
            }
        }
    }
}
