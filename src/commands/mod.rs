pub mod analyze;
pub mod settings;
pub mod split;
pub mod tools;

use anyhow::{Context, Result};
use clipforge::video::ffmpeg;
use clipforge::{CancelToken, EventSink, RunContext};

use crate::ui::{EventRenderer, ResolvedProgressMode};

/// Run `job` on a blocking worker while this task renders its events.
///
/// Ctrl-C cancels the run and kills any tool process still alive. Returns the
/// job's value together with the warnings the renderer collected.
pub async fn run_with_events<T, F>(mode: ResolvedProgressMode, job: F) -> Result<(T, Vec<String>)>
where
    F: FnOnce(RunContext) -> T + Send + 'static,
    T: Send + 'static,
{
    let cancel = CancelToken::new();
    let (sink, mut events) = EventSink::channel();
    let ctx = RunContext::new(sink, cancel.clone());

    // The sender lives in `ctx`; the channel closes when the job returns.
    let worker = tokio::task::spawn_blocking(move || job(ctx));

    let mut renderer = EventRenderer::new(mode);
    let interrupt = tokio::signal::ctrl_c();
    tokio::pin!(interrupt);
    let mut interrupted = false;

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => renderer.handle(&event),
                None => break,
            },
            _ = &mut interrupt, if !interrupted => {
                interrupted = true;
                tracing::info!("interrupt received, cancelling");
                renderer.note("Cancelling...");
                cancel.cancel();
                ffmpeg::kill_all_children();
            }
        }
    }

    let value = worker.await.context("worker task failed")?;
    Ok((value, renderer.finish()))
}
