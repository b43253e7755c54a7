//! Stage sequencer for ingestion jobs.
//!
//! Eager mode runs every stage before returning the record. Deferred mode
//! stores the raw upload, persists a provisional record and hands the rest to
//! two background tasks: thumbnails first, then audio and recognition once the
//! thumbnail task's handle has resolved.

use chrono::Utc;
use clipflow_core::constants::{MAX_PERSIST_BACKOFF_MS, THUMBNAIL_FOLDER};
use clipflow_core::models::{
    EventKind, IngestionJob, ProcessingStatus, ProgressTrack, RecognitionOutcome, Stage, Step,
    UploadRequest, VideoPatch, VideoRecord,
};
use clipflow_core::validation::{encode_file_name, split_title_extension, validate_upload, EncodedName};
use clipflow_core::PipelineSettings;
use clipflow_db::{PersistenceError, VideoCatalog};
use clipflow_processing::{Recognizer, TranscodeError, Transcoder};
use clipflow_storage::{artifact_key, content_type_for, ArtifactKind, Storage};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::bus::ProgressBus;
use crate::error::IngestError;
use crate::janitor::{Janitor, TransientArtifacts};
use crate::progress::{deferred, eager, recognition, Band, ProgressTracker};
use crate::scheduler::BackgroundScheduler;

/// External collaborators the pipeline drives.
#[derive(Clone)]
pub struct PipelineServices {
    pub storage: Arc<dyn Storage>,
    pub transcoder: Arc<dyn Transcoder>,
    /// `None` skips recognition for every job.
    pub recognizer: Option<Arc<dyn Recognizer>>,
    pub catalog: VideoCatalog,
    pub bus: ProgressBus,
}

struct Inner {
    services: PipelineServices,
    settings: PipelineSettings,
    janitor: Janitor,
    scheduler: BackgroundScheduler,
}

#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

/// What the background half of a deferred job produced.
#[derive(Debug)]
pub struct DeferredOutcome {
    pub thumbnails: Result<Vec<String>, IngestError>,
    pub recognition: RecognitionOutcome,
    /// Record after the last background update, `None` if that update failed.
    pub record: Option<VideoRecord>,
    pub stage: Stage,
}

/// Returned by `run_deferred` once the provisional record exists.
pub struct JobHandle {
    pub job_id: Uuid,
    /// The provisional record: raw video stored, status `pending`.
    pub record: VideoRecord,
    background: JoinHandle<Option<DeferredOutcome>>,
}

impl JobHandle {
    /// Wait for both background tasks.
    pub async fn wait(self) -> Result<DeferredOutcome, IngestError> {
        match self.background.await {
            Ok(Some(outcome)) => Ok(outcome),
            Ok(None) => Err(IngestError::Background(
                "recognition task was not run".to_string(),
            )),
            Err(e) => Err(IngestError::Background(e.to_string())),
        }
    }
}

#[derive(Clone)]
struct JobContext {
    job_id: Uuid,
    name: EncodedName,
    video_key: String,
    video_path: PathBuf,
    processing: Arc<ProgressTracker>,
    recognition: Arc<ProgressTracker>,
}

enum AudioTrack {
    Missing,
    Extracted { key: String, path: PathBuf },
    /// A track exists but extraction failed.
    Unavailable,
}

fn transcode_error(step: Step) -> impl Fn(TranscodeError) -> IngestError {
    move |source| IngestError::Transcoding { step, source }
}

async fn timed<T, F>(step: Step, after: Duration, fut: F) -> Result<T, IngestError>
where
    F: Future<Output = Result<T, IngestError>>,
{
    tokio::time::timeout(after, fut)
        .await
        .map_err(|_| IngestError::Timeout { step, after })?
}

async fn create_parent(path: &Path, step: Step) -> Result<(), IngestError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|source| IngestError::Io { step, source })?;
    }
    Ok(())
}

fn persist_backoff(base: Duration, attempt: u32) -> Duration {
    let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
    base.saturating_mul(factor)
        .min(Duration::from_millis(MAX_PERSIST_BACKOFF_MS))
}

fn is_retryable(err: &IngestError) -> bool {
    match err {
        IngestError::Persistence(e) => e.is_retryable(),
        IngestError::Timeout { .. } => true,
        _ => false,
    }
}

impl Orchestrator {
    pub fn new(services: PipelineServices, settings: PipelineSettings) -> Self {
        let janitor = Janitor::new(settings.work_dir.clone());
        let scheduler = BackgroundScheduler::new(settings.max_concurrent_jobs);
        Self {
            inner: Arc::new(Inner {
                services,
                settings,
                janitor,
                scheduler,
            }),
        }
    }

    pub fn catalog(&self) -> &VideoCatalog {
        &self.inner.services.catalog
    }

    pub fn bus(&self) -> &ProgressBus {
        &self.inner.services.bus
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.inner.settings
    }

    /// Run every stage and return the persisted record.
    ///
    /// Transient files are removed whatever the outcome. On a fatal error a
    /// `Failed` event is published and the error is returned.
    ///
    /// The recognition track completes as soon as recognition settles, before
    /// thumbnails are rendered. A later fatal error is reported on the
    /// processing track only, so a subscriber may see `RecognitionCompleted`
    /// for a job that then fails.
    #[tracing::instrument(skip(self, upload), fields(owner_id = %upload.owner_id, channel_id = %upload.channel_id, mode = "eager"))]
    pub async fn run_eager(&self, upload: UploadRequest) -> Result<VideoRecord, IngestError> {
        let start = Instant::now();
        let (ctx, mut job, data) = self.prepare(upload)?;
        tracing::info!(job_id = %ctx.job_id, video_key = %ctx.video_key, "Ingestion started");

        let transient = TransientArtifacts::new();
        let result = self.eager_stages(&ctx, &mut job, data, &transient).await;

        let report = self.inner.janitor.cleanup(transient.drain()).await;
        if !report.is_clean() {
            tracing::warn!(
                job_id = %ctx.job_id,
                failed = report.failed.len(),
                refused = report.refused.len(),
                "Cleanup incomplete"
            );
        }

        let result = result.and_then(|record| {
            job.transition(Stage::CleanedUp)?;
            Ok(record)
        });

        match result {
            Ok(record) => {
                let thumbnail_url = self
                    .signed_thumbnail(record.primary_thumbnail_key.as_deref())
                    .await;
                ctx.processing.complete(
                    eager::CLEANED_UP,
                    Stage::CleanedUp.label(),
                    EventKind::ProcessingCompleted { thumbnail_url },
                );
                tracing::info!(
                    job_id = %ctx.job_id,
                    video_id = %record.id,
                    matched = record.recognition.as_ref().is_some_and(|r| r.is_matched()),
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "Ingestion completed"
                );
                Ok(record)
            }
            Err(err) => {
                self.report_failure(&ctx, &mut job, &err);
                Err(err)
            }
        }
    }

    async fn eager_stages(
        &self,
        ctx: &JobContext,
        job: &mut IngestionJob,
        data: Vec<u8>,
        transient: &TransientArtifacts,
    ) -> Result<VideoRecord, IngestError> {
        self.store_raw(ctx, data, transient).await?;
        ctx.processing
            .advance(eager::RECEIVED, Stage::Received.label());

        let has_audio = self.probe(ctx, job).await?;
        job.transition(Stage::ProbeComplete)?;
        ctx.processing
            .advance(eager::PROBE_COMPLETE, Stage::ProbeComplete.label());
        ctx.recognition
            .advance(recognition::PROBED, Stage::ProbeComplete.label());

        let audio = if has_audio {
            self.extract_audio(ctx, transient).await?
        } else {
            AudioTrack::Missing
        };
        let label = match &audio {
            AudioTrack::Missing => {
                job.transition(Stage::NoAudio)?;
                Stage::NoAudio.label()
            }
            AudioTrack::Extracted { key, .. } => {
                job.audio_key = Some(key.clone());
                job.transition(Stage::AudioExtracted)?;
                Stage::AudioExtracted.label()
            }
            AudioTrack::Unavailable => eager::EXTRACTION_FAILED,
        };
        ctx.processing.advance(eager::AUDIO_RESOLVED, label);

        let outcome = match &audio {
            AudioTrack::Extracted { path, .. } => self.recognize(ctx, path).await,
            AudioTrack::Missing | AudioTrack::Unavailable => RecognitionOutcome::Skipped,
        };
        job.recognition = Some(outcome.clone());
        job.transition(Stage::Recognized)?;
        ctx.processing
            .advance(eager::RECOGNIZED, Stage::Recognized.label());
        ctx.recognition.complete(
            recognition::DONE,
            Stage::Recognized.label(),
            EventKind::RecognitionCompleted { outcome },
        );

        let thumbnails = self.generate_thumbnails(ctx, transient).await?;
        job.set_thumbnails(thumbnails.clone())?;
        ctx.processing.advance(
            eager::THUMBNAILS_GENERATED,
            Stage::ThumbnailsGenerated.label(),
        );

        let mut auxiliary: Vec<String> = job.audio_key.iter().cloned().collect();
        auxiliary.extend(thumbnails);
        tokio::try_join!(
            self.upload_keys(
                &ctx.processing,
                auxiliary,
                eager::AUX_UPLOAD,
                "Uploading artifacts"
            ),
            self.upload_keys(
                &ctx.processing,
                vec![ctx.video_key.clone()],
                eager::VIDEO_UPLOAD,
                "Uploading video"
            ),
        )?;
        job.transition(Stage::ArtifactsUploaded)?;
        ctx.processing.advance(
            eager::ARTIFACTS_UPLOADED,
            Stage::ArtifactsUploaded.label(),
        );

        let draft = job.to_draft(ProcessingStatus::Completed);
        let catalog = &self.inner.services.catalog;
        let record = self
            .persist_with_retry(ctx.job_id, move || catalog.create(draft.clone()))
            .await?;
        job.transition(Stage::Persisted)?;
        ctx.processing.set_video(record.id);
        ctx.recognition.set_video(record.id);
        ctx.processing
            .advance(eager::PERSISTED, Stage::Persisted.label());

        Ok(record)
    }

    /// Store the raw upload, persist a provisional record and schedule the
    /// remaining stages in the background.
    #[tracing::instrument(skip(self, upload), fields(owner_id = %upload.owner_id, channel_id = %upload.channel_id, mode = "deferred"))]
    pub async fn run_deferred(&self, upload: UploadRequest) -> Result<JobHandle, IngestError> {
        let (ctx, mut job, data) = self.prepare(upload)?;
        tracing::info!(job_id = %ctx.job_id, video_key = %ctx.video_key, "Ingestion started");

        let raw = Arc::new(TransientArtifacts::new());
        let catalog = &self.inner.services.catalog;
        let provisional = async {
            self.store_raw(&ctx, data, &raw).await?;
            self.upload_keys(
                &ctx.processing,
                vec![ctx.video_key.clone()],
                deferred::RAW_UPLOAD,
                "Uploading video",
            )
            .await?;
            let draft = job.to_draft(ProcessingStatus::Pending);
            self.persist_with_retry(ctx.job_id, move || catalog.create(draft.clone()))
                .await
        }
        .await;

        let record = match provisional {
            Ok(record) => record,
            Err(err) => {
                self.inner.janitor.cleanup(raw.drain()).await;
                self.report_failure(&ctx, &mut job, &err);
                return Err(err);
            }
        };

        let record_id = record.id;
        ctx.processing.set_video(record_id);
        ctx.recognition.set_video(record_id);
        ctx.processing.complete(
            deferred::PROVISIONAL_PERSISTED,
            "Upload stored",
            EventKind::UploadCompleted,
        );
        tracing::info!(job_id = %ctx.job_id, video_id = %record_id, "Provisional record persisted");

        let thumbnail_task = {
            let this = self.clone();
            let ctx = ctx.clone();
            let job = job.clone();
            self.inner
                .scheduler
                .spawn("thumbnails", ctx.job_id, async move {
                    this.deferred_thumbnails(&ctx, job, record_id).await
                })
        };

        let background = {
            let this = self.clone();
            let ctx = ctx.clone();
            self.inner.scheduler.spawn_after(
                "recognition",
                ctx.job_id,
                thumbnail_task,
                move |upstream| async move {
                    let (job, thumbnails) = match upstream {
                        Ok(Some(done)) => done,
                        Ok(None) => (
                            job,
                            Err(IngestError::Background(
                                "thumbnail task was not run".to_string(),
                            )),
                        ),
                        Err(e) => (job, Err(IngestError::Background(e.to_string()))),
                    };
                    this.deferred_recognition(&ctx, job, record_id, thumbnails, &raw)
                        .await
                },
            )
        };

        Ok(JobHandle {
            job_id: ctx.job_id,
            record,
            background,
        })
    }

    async fn deferred_thumbnails(
        &self,
        ctx: &JobContext,
        mut job: IngestionJob,
        record_id: Uuid,
    ) -> (IngestionJob, Result<Vec<String>, IngestError>) {
        let scratch = TransientArtifacts::new();
        let catalog = &self.inner.services.catalog;
        let result = async {
            let keys = self.generate_thumbnails(ctx, &scratch).await?;
            job.set_thumbnails(keys.clone())?;
            ctx.processing.advance(
                deferred::THUMBNAILS_GENERATED,
                Stage::ThumbnailsGenerated.label(),
            );

            self.upload_keys(
                &ctx.processing,
                keys.clone(),
                deferred::THUMBNAIL_UPLOAD,
                "Uploading thumbnails",
            )
            .await?;

            let patch = VideoPatch {
                thumbnail_keys: Some(keys.clone()),
                processing_status: Some(ProcessingStatus::Processing),
                ..Default::default()
            };
            let record = self
                .persist_with_retry(ctx.job_id, move || catalog.update(record_id, patch.clone()))
                .await?;
            ctx.processing
                .advance(deferred::RECORD_UPDATED, Stage::Persisted.label());
            Ok::<_, IngestError>((keys, record))
        }
        .await;

        self.inner.janitor.cleanup(scratch.drain()).await;

        match result {
            Ok((keys, record)) => {
                let thumbnail_url = self
                    .signed_thumbnail(record.primary_thumbnail_key.as_deref())
                    .await;
                ctx.processing.complete(
                    deferred::DONE,
                    "Thumbnails ready",
                    EventKind::ProcessingCompleted { thumbnail_url },
                );
                (job, Ok(keys))
            }
            Err(err) => {
                self.mark_record_failed(record_id).await;
                self.report_failure(ctx, &mut job, &err);
                (job, Err(err))
            }
        }
    }

    async fn deferred_recognition(
        &self,
        ctx: &JobContext,
        mut job: IngestionJob,
        record_id: Uuid,
        thumbnails: Result<Vec<String>, IngestError>,
        raw: &TransientArtifacts,
    ) -> DeferredOutcome {
        let (outcome, audio_key, probe_failed) = match self.probe(ctx, &mut job).await {
            Err(err) => {
                tracing::error!(job_id = %ctx.job_id, error = %err, "Probe failed in background");
                job.fail(err.step(), err.to_string());
                ctx.recognition.fail(err.step(), &err.to_string());
                (RecognitionOutcome::Skipped, None, true)
            }
            Ok(has_audio) => {
                ctx.recognition
                    .advance(recognition::PROBED, Stage::ProbeComplete.label());
                let audio = if has_audio {
                    self.extract_audio(ctx, raw).await
                } else {
                    Ok(AudioTrack::Missing)
                };
                match audio {
                    Ok(AudioTrack::Extracted { key, path }) => {
                        let stored = self
                            .upload_keys(
                                &ctx.recognition,
                                vec![key.clone()],
                                recognition::AUDIO_UPLOAD,
                                "Uploading audio",
                            )
                            .await;
                        let audio_key = match stored {
                            Ok(()) => Some(key),
                            Err(err) => {
                                tracing::warn!(
                                    job_id = %ctx.job_id,
                                    error = %err,
                                    "Audio upload failed, record keeps no audio key"
                                );
                                None
                            }
                        };
                        (self.recognize(ctx, &path).await, audio_key, false)
                    }
                    Ok(AudioTrack::Missing) => {
                        tracing::info!(job_id = %ctx.job_id, "No audio track, recognition skipped");
                        (RecognitionOutcome::Skipped, None, false)
                    }
                    Ok(AudioTrack::Unavailable) => (RecognitionOutcome::Skipped, None, false),
                    Err(err) => {
                        tracing::warn!(job_id = %ctx.job_id, error = %err, "Audio extraction failed");
                        (RecognitionOutcome::Skipped, None, false)
                    }
                }
            }
        };

        let status = if thumbnails.is_ok() && !probe_failed {
            ProcessingStatus::Completed
        } else {
            ProcessingStatus::Failed
        };
        let patch = VideoPatch {
            recognition: Some(outcome.clone()),
            audio_key: audio_key.clone(),
            duration: job.duration,
            processing_status: Some(status),
            ..Default::default()
        };
        let catalog = &self.inner.services.catalog;
        let record = match self
            .persist_with_retry(ctx.job_id, move || catalog.update(record_id, patch.clone()))
            .await
        {
            Ok(record) => {
                job.audio_key = audio_key;
                job.recognition = Some(outcome.clone());
                if status == ProcessingStatus::Completed {
                    if let Err(e) = job.transition(Stage::Persisted) {
                        tracing::warn!(job_id = %ctx.job_id, error = %e, "Unexpected job state");
                    }
                }
                Some(record)
            }
            Err(err) => {
                tracing::error!(job_id = %ctx.job_id, error = %err, "Recognition update abandoned");
                job.fail(Step::Persist, err.to_string());
                ctx.recognition.fail(Step::Persist, &err.to_string());
                None
            }
        };

        let report = self.inner.janitor.cleanup(raw.drain()).await;
        if !report.is_clean() {
            tracing::warn!(job_id = %ctx.job_id, failed = report.failed.len(), "Cleanup incomplete");
        }
        if job.stage == Stage::Persisted {
            if let Err(e) = job.transition(Stage::CleanedUp) {
                tracing::warn!(job_id = %ctx.job_id, error = %e, "Unexpected job state");
            }
        }

        // A failure event already closed the track.
        if record.is_some() && !probe_failed {
            ctx.recognition.complete(
                recognition::DONE,
                Stage::Recognized.label(),
                EventKind::RecognitionCompleted {
                    outcome: outcome.clone(),
                },
            );
        }
        tracing::info!(
            job_id = %ctx.job_id,
            video_id = %record_id,
            status = %status,
            matched = outcome.is_matched(),
            "Background processing finished"
        );

        DeferredOutcome {
            thumbnails,
            recognition: outcome,
            record,
            stage: job.stage.clone(),
        }
    }

    fn prepare(
        &self,
        upload: UploadRequest,
    ) -> Result<(JobContext, IngestionJob, Vec<u8>), IngestError> {
        let settings = &self.inner.settings;
        validate_upload(&upload, &settings.upload_limits)?;
        let name = encode_file_name(&upload.file_name, &upload.owner_id, Utc::now())?;

        let title = match upload.title.filter(|t| !t.trim().is_empty()) {
            Some(title) => title,
            None => split_title_extension(upload.file_name.trim()).0.to_string(),
        };
        let video_key = artifact_key(ArtifactKind::Video, &name.file_name());
        let mut job = IngestionJob::new(
            upload.owner_id,
            upload.channel_id,
            video_key.clone(),
            title,
            upload.description,
            upload.tags,
            upload.duration,
        );
        job.size_bytes = Some(upload.data.len() as u64);

        let bus = &self.inner.services.bus;
        let ctx = JobContext {
            job_id: job.id,
            name,
            video_path: settings.work_dir.join(&video_key),
            video_key,
            processing: Arc::new(ProgressTracker::new(
                bus.clone(),
                job.channel_id.clone(),
                job.id,
                ProgressTrack::Processing,
            )),
            recognition: Arc::new(ProgressTracker::new(
                bus.clone(),
                job.channel_id.clone(),
                job.id,
                ProgressTrack::Recognition,
            )),
        };
        Ok((ctx, job, upload.data))
    }

    async fn store_raw(
        &self,
        ctx: &JobContext,
        data: Vec<u8>,
        transient: &TransientArtifacts,
    ) -> Result<(), IngestError> {
        transient.record(ctx.video_key.clone());
        create_parent(&ctx.video_path, Step::Receive).await?;
        tokio::fs::write(&ctx.video_path, data)
            .await
            .map_err(|source| IngestError::Io {
                step: Step::Receive,
                source,
            })
    }

    /// Whether the raw video has an audio track. Also fills in the duration
    /// when the caller did not supply one.
    async fn probe(&self, ctx: &JobContext, job: &mut IngestionJob) -> Result<bool, IngestError> {
        let transcoder = &self.inner.services.transcoder;
        let after = self.inner.settings.stage_timeout;
        let has_audio = timed(Step::Probe, after, async {
            transcoder
                .has_audio_track(&ctx.video_path)
                .await
                .map_err(transcode_error(Step::Probe))
        })
        .await?;

        if job.duration.is_none() {
            let probed = timed(Step::Probe, after, async {
                transcoder
                    .probe_duration(&ctx.video_path)
                    .await
                    .map_err(transcode_error(Step::Probe))
            })
            .await;
            match probed {
                Ok(duration) => job.duration = duration,
                Err(err) => {
                    tracing::warn!(job_id = %ctx.job_id, error = %err, "Duration probe failed")
                }
            }
        }

        tracing::debug!(job_id = %ctx.job_id, has_audio, "Tracks probed");
        Ok(has_audio)
    }

    async fn extract_audio(
        &self,
        ctx: &JobContext,
        transient: &TransientArtifacts,
    ) -> Result<AudioTrack, IngestError> {
        let settings = &self.inner.settings;
        let key = artifact_key(
            ArtifactKind::Audio,
            &ctx.name.with_extension(&settings.audio_format),
        );
        let path = settings.work_dir.join(&key);
        transient.record(key.clone());

        let transcoder = &self.inner.services.transcoder;
        let extracted = async {
            create_parent(&path, Step::Extract).await?;
            timed(Step::Extract, settings.stage_timeout, async {
                transcoder
                    .extract_audio(&ctx.video_path, &path)
                    .await
                    .map_err(transcode_error(Step::Extract))
            })
            .await
        }
        .await;

        match extracted {
            Ok(()) => {
                ctx.recognition
                    .advance(recognition::EXTRACTED, Stage::AudioExtracted.label());
                Ok(AudioTrack::Extracted { key, path })
            }
            Err(err) if !err.is_fatal() => {
                tracing::warn!(
                    job_id = %ctx.job_id,
                    error = %err,
                    "Audio extraction failed, recognition skipped"
                );
                Ok(AudioTrack::Unavailable)
            }
            Err(err) => Err(err),
        }
    }

    /// Never fails: any error degrades to `Skipped`.
    async fn recognize(&self, ctx: &JobContext, audio_path: &Path) -> RecognitionOutcome {
        let Some(recognizer) = self.inner.services.recognizer.as_ref() else {
            tracing::debug!(job_id = %ctx.job_id, "No recognizer configured");
            return RecognitionOutcome::Skipped;
        };

        let start = Instant::now();
        let result = async {
            let sample = tokio::fs::read(audio_path)
                .await
                .map_err(|source| IngestError::Io {
                    step: Step::Recognize,
                    source,
                })?;
            ctx.recognition
                .advance(recognition::SUBMITTED, "Audio submitted");
            timed(Step::Recognize, self.inner.settings.stage_timeout, async {
                recognizer.identify(&sample).await.map_err(IngestError::from)
            })
            .await
        }
        .await;

        match result {
            Ok(response) => {
                let status_code = response.status_code;
                let outcome = response.into_outcome();
                ctx.recognition
                    .advance(recognition::IDENTIFIED, "Recognition response received");
                tracing::info!(
                    job_id = %ctx.job_id,
                    status_code,
                    matched = outcome.is_matched(),
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "Music recognition finished"
                );
                outcome
            }
            Err(err) => {
                tracing::warn!(
                    job_id = %ctx.job_id,
                    error = %err,
                    "Music recognition failed, outcome skipped"
                );
                RecognitionOutcome::Skipped
            }
        }
    }

    async fn generate_thumbnails(
        &self,
        ctx: &JobContext,
        transient: &TransientArtifacts,
    ) -> Result<Vec<String>, IngestError> {
        let settings = &self.inner.settings;
        let count = settings.thumbnail_count;
        let stem = &ctx.name.stem;
        // Record the expected names up front so partial output is cleaned too.
        transient.record_all(
            (1..=count).map(|n| artifact_key(ArtifactKind::Thumbnail, &format!("{stem}-{n}.png"))),
        );

        let output_dir = settings.work_dir.join(THUMBNAIL_FOLDER);
        tokio::fs::create_dir_all(&output_dir)
            .await
            .map_err(|source| IngestError::Io {
                step: Step::Thumbnail,
                source,
            })?;

        let transcoder = &self.inner.services.transcoder;
        let paths = timed(Step::Thumbnail, settings.stage_timeout, async {
            transcoder
                .generate_thumbnails(&ctx.video_path, &output_dir, stem, count)
                .await
                .map_err(transcode_error(Step::Thumbnail))
        })
        .await?;

        let mut keys = Vec::with_capacity(paths.len());
        for path in &paths {
            let file_name = path
                .file_name()
                .and_then(|n| n.to_str())
                .ok_or_else(|| IngestError::Transcoding {
                    step: Step::Thumbnail,
                    source: TranscodeError::InvalidPath(path.display().to_string()),
                })?;
            let key = artifact_key(ArtifactKind::Thumbnail, file_name);
            transient.record(key.clone());
            keys.push(key);
        }
        if keys.is_empty() {
            return Err(IngestError::Transcoding {
                step: Step::Thumbnail,
                source: TranscodeError::NoOutput(output_dir.display().to_string()),
            });
        }

        tracing::debug!(job_id = %ctx.job_id, count = keys.len(), "Thumbnails generated");
        Ok(keys)
    }

    /// Upload local files concurrently, filling `band` on `tracker` in
    /// proportion to bytes committed across all of them.
    async fn upload_keys(
        &self,
        tracker: &ProgressTracker,
        keys: Vec<String>,
        band: Band,
        label: &str,
    ) -> Result<(), IngestError> {
        let settings = &self.inner.settings;
        let mut files = Vec::with_capacity(keys.len());
        for key in keys {
            let data = tokio::fs::read(settings.work_dir.join(&key))
                .await
                .map_err(|source| IngestError::Io {
                    step: Step::Upload,
                    source,
                })?;
            files.push((key, data));
        }

        let total: u64 = files.iter().map(|(_, data)| data.len() as u64).sum();
        let done = AtomicU64::new(0);
        let storage = &self.inner.services.storage;

        let uploads = files.into_iter().map(|(key, data)| {
            let done = &done;
            async move {
                let reported = AtomicU64::new(0);
                let progress = |sent: u64, _total: u64| {
                    let previous = reported.fetch_max(sent, Ordering::AcqRel);
                    if sent > previous {
                        let delta = sent - previous;
                        let overall = done.fetch_add(delta, Ordering::AcqRel) + delta;
                        tracker.advance(band.at(overall, total), label);
                    }
                };
                let content_type = content_type_for(&key);
                timed(Step::Upload, settings.upload_timeout, async {
                    storage
                        .put_with_progress(&key, data, content_type, &progress)
                        .await
                        .map_err(|source| IngestError::Storage {
                            step: Step::Upload,
                            source,
                        })
                })
                .await?;
                tracing::debug!(key = %key, "Artifact uploaded");
                Ok::<_, IngestError>(())
            }
        });

        futures::future::try_join_all(uploads).await?;
        Ok(())
    }

    async fn persist_with_retry<F, Fut>(
        &self,
        job_id: Uuid,
        mut op: F,
    ) -> Result<VideoRecord, IngestError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<VideoRecord, PersistenceError>>,
    {
        let settings = &self.inner.settings;
        let mut attempt: u32 = 0;
        loop {
            let pending = op();
            let result = timed(Step::Persist, settings.stage_timeout, async move {
                pending.await.map_err(IngestError::from)
            })
            .await;

            match result {
                Ok(record) => return Ok(record),
                Err(err) if attempt < settings.persist_max_retries && is_retryable(&err) => {
                    let delay = persist_backoff(settings.persist_retry_base, attempt);
                    tracing::warn!(
                        job_id = %job_id,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Persist failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    if attempt > 0 {
                        tracing::error!(
                            job_id = %job_id,
                            attempts = attempt + 1,
                            error = %err,
                            "Persist abandoned"
                        );
                    }
                    return Err(err);
                }
            }
        }
    }

    async fn signed_thumbnail(&self, key: Option<&str>) -> Option<String> {
        let key = key?;
        match self
            .inner
            .services
            .storage
            .signed_url(key, self.inner.settings.signed_url_ttl)
            .await
        {
            Ok(url) => Some(url),
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Could not sign thumbnail URL");
                None
            }
        }
    }

    async fn mark_record_failed(&self, record_id: Uuid) {
        let patch = VideoPatch {
            processing_status: Some(ProcessingStatus::Failed),
            ..Default::default()
        };
        if let Err(e) = self.inner.services.catalog.update(record_id, patch).await {
            tracing::warn!(video_id = %record_id, error = %e, "Could not mark record failed");
        }
    }

    fn report_failure(&self, ctx: &JobContext, job: &mut IngestionJob, err: &IngestError) {
        let step = err.step();
        job.fail(step, err.to_string());
        ctx.processing.fail(step, &err.to_string());
        tracing::error!(
            job_id = %ctx.job_id,
            step = %step,
            severity = ?err.severity(),
            error = %err,
            "Ingestion failed"
        );
    }
}
