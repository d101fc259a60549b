//! Orchestration loop: spawn, stream, parse, settle, release
//!
//! One cooperative task multiplexes every event source for the operation:
//! output chunks, process exit, transport failure and cancellation. None of
//! the handlers preempt one another, and none of them are ordered; the
//! first-wins settlement rule in the arbiter is the only thing that decides
//! the terminal outcome.

use futures::StreamExt;
use std::sync::Arc;
use tokio::process::Child;

use crate::arbiter::{CompletionArbiter, SettleSignal};
use crate::cancel::{terminate_tree, CancelHandle};
use crate::error::OperationError;
use crate::framing::LineFramer;
use crate::invoker;
use crate::operation::{OperationRegistry, OperationSpec, Outcome};
use crate::progress::{ProgressEvent, ProgressParser, ProgressSink};
use crate::transport::{DirectPipe, OutputTransport, SocketRelay, TransportKind};

/// Run one operation end-to-end and return its terminal outcome.
///
/// Settlement happens exactly once no matter which event fires first, and the
/// release routine (kill-if-alive, close transport) runs exactly once on every
/// exit path. No progress reaches the sink after settlement.
pub async fn run_operation(
    spec: OperationSpec,
    sink: Arc<dyn ProgressSink>,
    cancel: CancelHandle,
) -> Outcome {
    OperationRegistry::global().begin(spec.kind, &spec.name).await;

    let (mut arbiter, settled) = CompletionArbiter::new(&spec.name);
    let mut child: Option<Child> = None;
    let mut tee: Option<Child> = None;
    let mut transport: Option<Box<dyn OutputTransport>> = None;

    drive(
        &spec,
        sink.as_ref(),
        &cancel,
        &mut arbiter,
        &mut child,
        &mut tee,
        &mut transport,
    )
    .await;

    // The drive loop never returns without settling, so the slot has been sent.
    let outcome = match settled.await {
        Ok(outcome) => outcome,
        Err(_) => Outcome::Canceled,
    };

    release(&mut child, &mut tee, &mut transport).await;
    OperationRegistry::global().finish(spec.kind).await;
    tracing::info!(operation = %spec.name, state = ?outcome.state(), "operation finished");
    outcome
}

async fn drive(
    spec: &OperationSpec,
    sink: &dyn ProgressSink,
    cancel: &CancelHandle,
    arbiter: &mut CompletionArbiter,
    child_slot: &mut Option<Child>,
    tee_slot: &mut Option<Child>,
    transport_slot: &mut Option<Box<dyn OutputTransport>>,
) {
    // The relay endpoint must exist before the process starts so the
    // forwarding helper has something to connect to.
    let relay_path = match spec.transport {
        TransportKind::Relay => match SocketRelay::bind() {
            Ok(relay) => {
                let path = relay.path().to_path_buf();
                *transport_slot = Some(Box::new(relay));
                Some(path)
            }
            Err(e) => {
                arbiter.settle(SettleSignal::Transport(transport_error(spec, e)));
                return;
            }
        },
        TransportKind::Direct => None,
    };

    let spawned = match invoker::spawn(spec, relay_path.as_deref()) {
        Ok(spawned) => spawned,
        Err(e) => {
            arbiter.settle(SettleSignal::Fault(e));
            return;
        }
    };
    let child = child_slot.insert(spawned.child);
    *tee_slot = spawned.tee;
    if spec.transport == TransportKind::Direct {
        *transport_slot = Some(Box::new(DirectPipe::new(spawned.stdout)));
    }
    let Some(transport) = transport_slot.as_mut() else {
        // Both variants populate the slot above; settle rather than hang if
        // that ever stops holding.
        arbiter.settle(SettleSignal::Fault(OperationError::Runtime {
            operation: spec.name.clone(),
            source: std::io::Error::other("no transport bound for operation"),
        }));
        return;
    };

    // Waiting for the transport races against cancellation and early death of
    // the process (for the relay variant, the producer connects only once the
    // pipeline is up).
    let mut chunks = tokio::select! {
        biased;
        _ = cancel.canceled() => {
            arbiter.settle(SettleSignal::Canceled);
            return;
        }
        opened = transport.open() => match opened {
            Ok(stream) => stream,
            Err(e) => {
                arbiter.settle(SettleSignal::Transport(transport_error(spec, e)));
                return;
            }
        },
        status = child.wait() => {
            settle_exit(spec, arbiter, status);
            return;
        }
    };

    let mut framer = LineFramer::new();
    let mut parser = ProgressParser::new(spec.kind);
    let mut stream_done = false;

    loop {
        tokio::select! {
            biased;
            _ = cancel.canceled() => {
                arbiter.settle(SettleSignal::Canceled);
                return;
            }
            chunk = chunks.next(), if !stream_done => match chunk {
                Some(Ok(bytes)) => {
                    for line in framer.push(&bytes) {
                        emit(sink, &mut parser, &line);
                    }
                }
                Some(Err(e)) => {
                    arbiter.settle(SettleSignal::Transport(transport_error(spec, e)));
                    return;
                }
                None => {
                    if let Some(line) = framer.finish() {
                        emit(sink, &mut parser, &line);
                    }
                    stream_done = true;
                }
            },
            status = child.wait() => {
                settle_exit(spec, arbiter, status);
                return;
            }
        }
    }
}

fn settle_exit(
    spec: &OperationSpec,
    arbiter: &mut CompletionArbiter,
    status: std::io::Result<std::process::ExitStatus>,
) {
    match status {
        Ok(status) => arbiter.settle(SettleSignal::Exited(status)),
        Err(e) => arbiter.settle(SettleSignal::Fault(OperationError::Runtime {
            operation: spec.name.clone(),
            source: e,
        })),
    };
}

fn transport_error(spec: &OperationSpec, source: std::io::Error) -> OperationError {
    OperationError::Transport {
        operation: spec.name.clone(),
        source,
    }
}

fn emit(sink: &dyn ProgressSink, parser: &mut ProgressParser, line: &str) {
    match parser.parse_line(line) {
        ProgressEvent::NoOp => {}
        ProgressEvent::PhaseChanged { label } => {
            tracing::debug!(phase = label, "phase change");
            sink.update(label, None);
        }
        ProgressEvent::PercentAdvanced { label, increment } => {
            tracing::trace!(phase = label, increment, "progress");
            sink.update(label, Some(increment));
        }
    }
}

/// Unconditional cleanup after settlement: terminate the process tree if it is
/// still alive, reap the forwarding helper, close the transport.
async fn release(
    child: &mut Option<Child>,
    tee: &mut Option<Child>,
    transport: &mut Option<Box<dyn OutputTransport>>,
) {
    if let Some(child) = child.as_mut() {
        match child.try_wait() {
            Ok(Some(_)) => {}
            _ => terminate_tree(child).await,
        }
    }
    if let Some(tee) = tee.as_mut() {
        if !matches!(tee.try_wait(), Ok(Some(_))) {
            let _ = tee.kill().await;
        }
        let _ = tee.wait().await;
    }
    if let Some(transport) = transport.as_mut() {
        transport.close().await;
    }
}
