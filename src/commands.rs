//! Command execution.

use crate::Commands;
use colored::Colorize;
use franz_client::{Channel, ClientConfig, ClientError, Consumer, Producer};
use franz_protocol::{Message, Offset, OffsetTime, TopicPartition};
use std::io::Write;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, BufReader};

/// Delay between empty polls in follow mode.
const FOLLOW_INTERVAL: Duration = Duration::from_millis(500);

pub async fn execute<S>(
    channel: Channel<S>,
    config: &ClientConfig,
    cmd: Commands,
) -> Result<String, Box<dyn std::error::Error>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    match cmd {
        Commands::Produce {
            topic,
            partition,
            compression,
            payloads,
        } => {
            let codec = compression.unwrap_or(config.compression);
            let mut producer = Producer::new(channel);

            if payloads.is_empty() {
                let mut lines = BufReader::new(tokio::io::stdin()).lines();
                while let Some(line) = lines.next_line().await? {
                    producer.add(&topic, partition, line, codec)?;
                }
            } else {
                for payload in payloads {
                    producer.add(&topic, partition, payload, codec)?;
                }
            }

            let count = producer.pending_count();
            let written = producer.send().await?;
            Ok(format!(
                "{} {} message(s) to {} ({} bytes, {})",
                "Sent".green(),
                count,
                TopicPartition::new(topic, partition).to_string().cyan(),
                written,
                codec
            ))
        }

        Commands::Consume {
            topic,
            partition,
            offset,
            max_size,
            count,
            follow,
        } => {
            let target = TopicPartition::new(topic, partition);
            let max_size = max_size.unwrap_or(config.fetch_max_size);
            let mut consumer = Consumer::new(channel, target, offset, max_size);
            let consumed = consume(&mut consumer, count, follow).await?;
            Ok(format!(
                "{} {} message(s), next offset {}",
                "Consumed".green(),
                consumed,
                consumer.offset().to_string().yellow()
            ))
        }

        Commands::Offsets {
            topic,
            partition,
            time,
            max,
        } => {
            let time = parse_time(&time)?;
            let target = TopicPartition::new(topic, partition);
            let mut consumer = Consumer::new(channel, target, Offset::ZERO, 0);
            let offsets = consumer.offsets_before(time, max).await?;
            if offsets.is_empty() {
                return Ok("No offsets".yellow().to_string());
            }

            let mut output = format!("{}\n", format!("Offsets of {}", consumer.target()).bold());
            for offset in offsets {
                output.push_str(&format!("  {} ({})\n", offset.to_string().cyan(), offset.to_hex()));
            }
            Ok(output.trim_end().to_string())
        }
    }
}

async fn consume<S>(
    consumer: &mut Consumer<S>,
    limit: Option<usize>,
    follow: bool,
) -> Result<usize, ClientError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let max_size = consumer.max_size();
    let mut consumed = 0;
    loop {
        let mut set = consumer.fetch().await?;
        while let Some(message) = set.next().await? {
            // A closed stdout (e.g. piped into `head`) ends the command.
            write_message(&mut std::io::stdout().lock(), &message)?;
            consumed += 1;
            if limit.is_some_and(|n| consumed >= n) {
                return Ok(consumed);
            }
        }
        let stalled = set.consumed() == 0;
        if stalled && set.partial_tail().is_some() {
            return Err(ClientError::MessageTooLarge {
                offset: set.offset(),
                max_size,
            });
        }

        if !follow {
            if stalled {
                return Ok(consumed);
            }
            continue;
        }
        if stalled {
            tokio::select! {
                _ = tokio::time::sleep(FOLLOW_INTERVAL) => {}
                _ = tokio::signal::ctrl_c() => return Ok(consumed),
            }
        }
    }
}

fn write_message(out: &mut impl Write, message: &Message) -> std::io::Result<()> {
    for payload in message.payloads() {
        out.write_all(&payload)?;
        out.write_all(b"\n")?;
    }
    out.flush()
}

fn parse_time(s: &str) -> Result<OffsetTime, String> {
    match s {
        "latest" => Ok(OffsetTime::Latest),
        "earliest" => Ok(OffsetTime::Earliest),
        ms => ms
            .parse()
            .map(OffsetTime::Before)
            .map_err(|_| format!("invalid time '{}': expected latest, earliest or milliseconds", ms)),
    }
}
