//! Event-driven media probes.
//!
//! Both probes wait for a one-shot host event with a fallback timer. The
//! handler is registered only while waiting and is gone once either side wins.

use std::time::Duration;

use async_trait::async_trait;

use crate::aggregator::Collector;
use crate::hasher::digest;
use crate::host::Host;
use crate::policy::{first_event, Raced, TimeoutPolicy};
use crate::signal::{Placeholder, SignalSource, SourceShape};

/// Rendered samples that feed the audio digest.
pub const AUDIO_SAMPLES: usize = 30;

/// Characters of the audio digest shown before the ellipsis.
const AUDIO_PREVIEW: usize = 12;

/// Digest of the first rendered audio samples.
///
/// The payload of the render event is a whitespace-separated list of sample
/// values. The full digest is recorded; a truncated preview is shown.
#[derive(Debug, Clone)]
pub struct AudioFingerprintSource {
    policy: TimeoutPolicy,
}

impl AudioFingerprintSource {
    pub fn new(fallback: Duration) -> Self {
        Self {
            policy: TimeoutPolicy::timeout(fallback),
        }
    }
}

/// Digest of the first [`AUDIO_SAMPLES`] samples, concatenated without a
/// separator.
pub fn audio_digest(payload: &str) -> String {
    let joined: String = payload.split_whitespace().take(AUDIO_SAMPLES).collect();
    digest(&joined)
}

#[async_trait]
impl SignalSource for AudioFingerprintSource {
    fn name(&self) -> &str {
        "audio-fp"
    }

    fn shape(&self) -> SourceShape {
        SourceShape::Event {
            fallback: self.policy.bound,
        }
    }

    fn keys(&self) -> &[&'static str] {
        &["audio-fp"]
    }

    async fn collect(&self, host: &dyn Host, out: &Collector) {
        let Some(channel) = host.audio_render() else {
            out.fail("audio-fp", Placeholder::NotSupported);
            return;
        };
        match first_event(channel.as_ref(), &self.policy).await {
            Ok(Raced::Completed(samples)) => {
                let hash = audio_digest(&samples);
                let preview: String = hash.chars().take(AUDIO_PREVIEW).collect();
                out.record_shown("audio-fp", hash, format!("{preview}..."));
            }
            Ok(Raced::Expired(placeholder)) => out.fail("audio-fp", placeholder),
            Err(err) => out.fail("audio-fp", Placeholder::for_error(&err)),
        }
    }
}

/// Number of speech voices the host offers.
///
/// A populated list answers at once; otherwise the first change event does.
#[derive(Debug, Clone)]
pub struct VoicesSource {
    policy: TimeoutPolicy,
}

impl VoicesSource {
    pub fn new(fallback: Duration) -> Self {
        Self {
            policy: TimeoutPolicy::new(fallback, Placeholder::NotDetected),
        }
    }
}

fn count_voices(payload: &str) -> usize {
    payload.lines().filter(|l| !l.trim().is_empty()).count()
}

#[async_trait]
impl SignalSource for VoicesSource {
    fn name(&self) -> &str {
        "voices"
    }

    fn shape(&self) -> SourceShape {
        SourceShape::Event {
            fallback: self.policy.bound,
        }
    }

    fn keys(&self) -> &[&'static str] {
        &["voices"]
    }

    async fn collect(&self, host: &dyn Host, out: &Collector) {
        let Some(channel) = host.voice_catalog() else {
            out.fail("voices", Placeholder::NotSupported);
            return;
        };
        match first_event(channel.as_ref(), &self.policy).await {
            Ok(Raced::Completed(list)) => match count_voices(&list) {
                0 => out.record("voices", Placeholder::NotDetected),
                n => out.record("voices", format!("{n} voices")),
            },
            Ok(Raced::Expired(placeholder)) => out.fail("voices", placeholder),
            Err(err) => out.fail("voices", Placeholder::for_error(&err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio::sync::mpsc;
    use tokio::time::{sleep, Instant};

    use super::*;
    use crate::aggregator::Aggregator;
    use crate::host::{ManualEvent, StaticHost};

    fn collector() -> (Arc<Aggregator>, Collector, mpsc::UnboundedReceiver<crate::signal::SignalUpdate>) {
        let aggregator = Arc::new(Aggregator::new());
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::clone(&aggregator), Collector::new("media", aggregator, tx), rx)
    }

    #[test]
    fn test_audio_digest_uses_first_samples() {
        let samples: Vec<String> = (0..40).map(|i| format!("0.{i:03}")).collect();
        let first: String = samples[..30].concat();
        assert_eq!(audio_digest(&samples.join(" ")), digest(&first));
    }

    #[tokio::test(start_paused = true)]
    async fn test_audio_event_records_full_digest() {
        let render = Arc::new(ManualEvent::new());
        let host = StaticHost {
            audio_render: Some(Arc::clone(&render)),
            ..StaticHost::default()
        };
        let source = AudioFingerprintSource::new(Duration::from_millis(1000));
        let (aggregator, out, mut rx) = collector();

        let firing = async {
            sleep(Duration::from_millis(100)).await;
            render.fire("0.1 0.2 0.3");
        };
        tokio::join!(source.collect(&host, &out), firing);

        let expected = audio_digest("0.1 0.2 0.3");
        assert_eq!(aggregator.store().value("audio-fp"), Some(expected.as_str()));
        let shown = rx.try_recv().unwrap().value;
        assert!(shown.ends_with("..."));
        assert!(expected.starts_with(shown.trim_end_matches("...")));
        assert_eq!(render.listener_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_audio_fallback_deregisters_handler() {
        let render = Arc::new(ManualEvent::new());
        let host = StaticHost {
            audio_render: Some(Arc::clone(&render)),
            ..StaticHost::default()
        };
        let source = AudioFingerprintSource::new(Duration::from_millis(1000));
        let (aggregator, out, _rx) = collector();

        let start = Instant::now();
        source.collect(&host, &out).await;

        assert!(start.elapsed() >= Duration::from_millis(1000));
        assert_eq!(aggregator.store().value("audio-fp"), Some("timeout"));
        assert_eq!(render.listener_count(), 0);
        assert_eq!(render.fire("late"), 0);
    }

    #[tokio::test]
    async fn test_missing_audio_is_not_supported() {
        let source = AudioFingerprintSource::new(Duration::from_millis(1000));
        let (aggregator, out, _rx) = collector();
        source.collect(&StaticHost::default(), &out).await;
        assert_eq!(aggregator.store().value("audio-fp"), Some("not supported"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_populated_voices_answer_immediately() {
        let catalog = Arc::new(ManualEvent::new());
        catalog.set_current("Amelie\nDaniel\nThomas");
        let host = StaticHost {
            voice_catalog: Some(Arc::clone(&catalog)),
            ..StaticHost::default()
        };
        let source = VoicesSource::new(Duration::from_millis(1000));
        let (aggregator, out, _rx) = collector();

        let start = Instant::now();
        source.collect(&host, &out).await;

        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(aggregator.store().value("voices"), Some("3 voices"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_voices_after_fallback() {
        let catalog = Arc::new(ManualEvent::new());
        let host = StaticHost {
            voice_catalog: Some(Arc::clone(&catalog)),
            ..StaticHost::default()
        };
        let source = VoicesSource::new(Duration::from_millis(1000));
        let (aggregator, out, _rx) = collector();

        source.collect(&host, &out).await;
        assert_eq!(aggregator.store().value("voices"), Some("not detected"));
    }
}
