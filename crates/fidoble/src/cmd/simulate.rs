use std::time::{Duration, Instant};

use fidoble::simulator::{Behavior, Transcript, VirtualAuthenticator};
use fidoble_frame::Frame;
use fidoble_transaction::{BleTransport, TransactionConfig, TransactionError};
use fidoble_transport::channel_link;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cmd::{parse_duration, BehaviorArg, SimulateArgs};
use crate::exit::{io_error, transaction_error, CliResult, SUCCESS};
use crate::output::{new_table, print_json, print_raw, FrameOutput, OutputFormat};

const NOTIFICATION_QUEUE: usize = 64;

#[derive(Serialize, Debug)]
struct TraceOutput {
    direction: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    acked: Option<bool>,
    hex: String,
}

#[derive(Serialize, Debug)]
struct SimulateReport {
    behavior: &'static str,
    control_point_length: u16,
    device_timeout_ms: u128,
    request: FrameOutput,
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    response: Option<FrameOutput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    elapsed_ms: f64,
    trace: Vec<TraceOutput>,
}

pub fn run(args: SimulateArgs, format: OutputFormat) -> CliResult<i32> {
    let config = TransactionConfig {
        device_timeout: parse_duration(&args.timeout)?,
    };
    let behavior = behavior(&args)?;
    let cancel_after = args
        .cancel_after
        .as_deref()
        .map(parse_duration)
        .transpose()?;
    let request = Frame::new(args.command.into(), args.payload.resolve()?);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .map_err(|err| io_error("failed to start runtime", err))?;

    let start = Instant::now();
    let (result, transcript) = runtime.block_on(simulate(
        request.clone(),
        args.control_point_length,
        config.clone(),
        behavior,
        cancel_after,
    ));
    let elapsed = start.elapsed();

    let report = SimulateReport {
        behavior: args.behavior.name(),
        control_point_length: args.control_point_length,
        device_timeout_ms: config.device_timeout.as_millis(),
        request: FrameOutput::new(&request),
        status: if result.is_ok() { "ok" } else { "error" },
        response: result
            .as_ref()
            .ok()
            .or_else(|| result.as_ref().err().and_then(TransactionError::frame))
            .map(FrameOutput::new),
        error: result.as_ref().err().map(ToString::to_string),
        elapsed_ms: (elapsed.as_secs_f64() * 1000.0 * 100.0).round() / 100.0,
        trace: transcript
            .events
            .iter()
            .map(|event| TraceOutput {
                direction: event.direction.as_str(),
                acked: event.acked,
                hex: hex::encode(&event.data),
            })
            .collect(),
    };
    print_report(&report, &result, format);

    match result {
        Ok(_) => Ok(SUCCESS),
        Err(err) => Err(transaction_error("transaction failed", &err)),
    }
}

fn behavior(args: &SimulateArgs) -> CliResult<Behavior> {
    Ok(match args.behavior {
        BehaviorArg::Echo => Behavior::Echo,
        BehaviorArg::Keepalive => Behavior::KeepAliveThenEcho {
            count: args.keepalives,
            interval: parse_duration(&args.keepalive_interval)?,
        },
        BehaviorArg::Error => Behavior::Error(args.error_code),
        BehaviorArg::Silent => Behavior::Silent,
        BehaviorArg::FailWrite => Behavior::FailWrite,
        BehaviorArg::Malformed => Behavior::Malformed,
    })
}

async fn simulate(
    request: Frame,
    control_point_length: u16,
    config: TransactionConfig,
    behavior: Behavior,
    cancel_after: Option<Duration>,
) -> (Result<Frame, TransactionError>, Transcript) {
    let (connection, notifications, peer) = channel_link(NOTIFICATION_QUEUE);
    let device = tokio::spawn(VirtualAuthenticator::new(peer, control_point_length, behavior).run());
    let mut transport = BleTransport::new(connection, notifications, control_point_length, config);

    let cancel = CancellationToken::new();
    if let Some(delay) = cancel_after {
        let token = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            info!(?delay, "cancelling request");
            token.cancel();
        });
    }

    let result = transport.transact_with_cancel(request, &cancel).await;

    // Closing the host side stops the virtual authenticator.
    drop(transport);
    let transcript = device.await.unwrap_or_else(|err| {
        warn!(%err, "virtual authenticator task failed");
        Transcript::default()
    });
    (result, transcript)
}

fn print_report(
    report: &SimulateReport,
    result: &Result<Frame, TransactionError>,
    format: OutputFormat,
) {
    match format {
        OutputFormat::Json => print_json(report),
        OutputFormat::Table => {
            let mut table = new_table(vec!["#", "DIRECTION", "ACK", "BYTES"]);
            for (i, event) in report.trace.iter().enumerate() {
                table.add_row(vec![
                    i.to_string(),
                    event.direction.to_string(),
                    event
                        .acked
                        .map_or_else(|| "-".to_string(), |ok| ok.to_string()),
                    event.hex.clone(),
                ]);
            }
            println!("{table}");
            print_outcome(report);
        }
        OutputFormat::Pretty => {
            for event in &report.trace {
                let ack = match event.acked {
                    Some(true) => " (ack)",
                    Some(false) => " (write failed)",
                    None => "",
                };
                println!("{} {}{ack}", event.direction, event.hex);
            }
            print_outcome(report);
        }
        OutputFormat::Raw => {
            if let Ok(frame) = result {
                print_raw(frame.data());
            }
        }
    }
}

fn print_outcome(report: &SimulateReport) {
    println!(
        "behavior={} status={} elapsed={:.2}ms",
        report.behavior, report.status, report.elapsed_ms
    );
    if let Some(response) = &report.response {
        println!(
            "response command={} length={} payload={}",
            response.command, response.length, response.payload
        );
    }
    if let Some(error) = &report.error {
        println!("error: {error}");
    }
}

#[cfg(test)]
mod tests {
    use fidoble_frame::FrameCommand;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn echo_simulation_records_trace() {
        let request = Frame::new(FrameCommand::Msg, vec![0x11; 30]);
        let (result, transcript) = simulate(
            request.clone(),
            20,
            TransactionConfig::default(),
            Behavior::Echo,
            None,
        )
        .await;

        assert_eq!(result.unwrap(), request);
        assert_eq!(transcript.requests, 1);
        assert_eq!(transcript.events.len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_after_stops_silent_device() {
        let (result, _) = simulate(
            Frame::new(FrameCommand::Msg, vec![1]),
            20,
            TransactionConfig::default(),
            Behavior::Silent,
            Some(Duration::from_millis(500)),
        )
        .await;

        assert_eq!(result.unwrap_err(), TransactionError::Cancelled);
    }
}
