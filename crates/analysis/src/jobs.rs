//! Geoprocessing-style job submission
//!
//! Models the request/await contract of a viewshed geoprocessing service:
//! a job is submitted with named parameters, at most one job is in flight
//! per runner, the caller polls a busy/terminal status and may request
//! cancellation, and the finished job hands back named output layers.
//!
//! The runner and its worker communicate over typed `mpsc` messages scoped
//! to the runner's lifetime; there is no broadcast or shared registry.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;

use geo_types::{Geometry, Point};

use crate::sector::{ring_sector_mask, RingSectorSpec};
use crate::viewshed::{radial_viewshed, RadialViewshedParams};
use sightline_core::vector::{AttributeValue, Feature, FeatureCollection};
use sightline_core::{Error, Raster, Result};

/// Whether a submission runs on the calling thread or a worker thread.
///
/// Callers must branch on this before submitting: synchronous jobs have a
/// terminal status as soon as `submit` returns, asynchronous jobs must be
/// polled (or waited on).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    Synchronous,
    Asynchronous,
}

/// Named parameters of a viewshed job.
#[derive(Debug, Clone)]
pub struct ViewshedJobParams {
    /// Observer positions in map coordinates
    pub observers: Vec<Point<f64>>,
    /// Minimum visible range (RADIUS1)
    pub inner_radius: f64,
    /// Maximum visible range (RADIUS2)
    pub outer_radius: f64,
    /// Start of the bearing span (AZIMUTH1)
    pub start_bearing: f64,
    /// End of the bearing span (AZIMUTH2)
    pub end_bearing: f64,
    /// Observer height above the surface (OFFSETA)
    pub observer_offset: f64,
    /// Apply Earth-curvature/refraction correction
    pub curvature: bool,
}

impl Default for ViewshedJobParams {
    fn default() -> Self {
        Self {
            observers: Vec::new(),
            inner_radius: 0.0,
            outer_radius: 1000.0,
            start_bearing: 0.0,
            end_bearing: 360.0,
            observer_offset: 2.0,
            curvature: true,
        }
    }
}

/// Output layers of a finished viewshed job.
#[derive(Debug, Clone)]
pub struct JobOutput {
    /// Per-cell count of observers that can see the cell
    pub viewshed: Raster<f64>,
    /// One range-fan mask feature per processed observer
    pub wedges: FeatureCollection,
    /// Full 360° ring feature per processed observer
    pub full_wedges: FeatureCollection,
    /// Observer indices skipped (off the surface or on a void cell)
    pub skipped_observers: Vec<usize>,
}

/// Caller-visible job state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Idle,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

enum WorkerReply {
    Finished(Box<JobOutput>),
    Failed(String),
    Cancelled,
}

/// Runs viewshed jobs against one surface, one at a time.
pub struct JobRunner {
    dem: Arc<Raster<f64>>,
    mode: ExecutionMode,
    state: JobStatus,
    cancel: Arc<AtomicBool>,
    reply_rx: Option<mpsc::Receiver<WorkerReply>>,
    worker: Option<thread::JoinHandle<()>>,
    output: Option<JobOutput>,
    last_error: Option<String>,
}

impl JobRunner {
    pub fn new(dem: Arc<Raster<f64>>, mode: ExecutionMode) -> Self {
        Self {
            dem,
            mode,
            state: JobStatus::Idle,
            cancel: Arc::new(AtomicBool::new(false)),
            reply_rx: None,
            worker: None,
            output: None,
            last_error: None,
        }
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    /// Submit a job.
    ///
    /// Fails with [`Error::JobBusy`] while a previous job is still in
    /// flight. In synchronous mode the job completes before this returns
    /// and a failure is reported directly; in asynchronous mode failures
    /// surface through [`status`](Self::status).
    pub fn submit(&mut self, params: ViewshedJobParams) -> Result<()> {
        if self.state == JobStatus::Running {
            return Err(Error::JobBusy);
        }

        self.cancel.store(false, Ordering::Relaxed);
        self.output = None;
        self.last_error = None;

        match self.mode {
            ExecutionMode::Synchronous => {
                match run_viewshed_job(&self.dem, &params, &self.cancel) {
                    Ok(Some(output)) => {
                        self.output = Some(output);
                        self.state = JobStatus::Succeeded;
                        Ok(())
                    }
                    Ok(None) => {
                        self.state = JobStatus::Cancelled;
                        Ok(())
                    }
                    Err(e) => {
                        self.state = JobStatus::Failed;
                        self.last_error = Some(e.to_string());
                        Err(Error::JobFailed(e.to_string()))
                    }
                }
            }
            ExecutionMode::Asynchronous => {
                let (tx, rx) = mpsc::channel();
                let dem = Arc::clone(&self.dem);
                let cancel = Arc::clone(&self.cancel);

                self.reply_rx = Some(rx);
                self.state = JobStatus::Running;
                self.worker = Some(thread::spawn(move || {
                    let reply = match run_viewshed_job(&dem, &params, &cancel) {
                        Ok(Some(output)) => WorkerReply::Finished(Box::new(output)),
                        Ok(None) => WorkerReply::Cancelled,
                        Err(e) => WorkerReply::Failed(e.to_string()),
                    };
                    // receiver may already be gone if the runner was dropped
                    let _ = tx.send(reply);
                }));
                Ok(())
            }
        }
    }

    /// Poll the job status, draining any pending worker reply.
    pub fn status(&mut self) -> JobStatus {
        if self.state == JobStatus::Running {
            let reply = self.reply_rx.as_ref().and_then(|rx| match rx.try_recv() {
                Ok(reply) => Some(reply),
                Err(mpsc::TryRecvError::Empty) => None,
                Err(mpsc::TryRecvError::Disconnected) => {
                    Some(WorkerReply::Failed("worker thread exited".to_string()))
                }
            });
            if let Some(reply) = reply {
                self.finish(reply);
            }
        }
        self.state
    }

    /// Block until the in-flight job reaches a terminal state.
    pub fn wait(&mut self) -> JobStatus {
        if self.state == JobStatus::Running {
            let reply = match self.reply_rx.as_ref().map(|rx| rx.recv()) {
                Some(Ok(reply)) => reply,
                _ => WorkerReply::Failed("worker thread exited".to_string()),
            };
            self.finish(reply);
        }
        self.state
    }

    /// Request cooperative cancellation of the in-flight job.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    /// Retrieve the finished job's output layers.
    ///
    /// Returns `None` unless the last job succeeded; the output is handed
    /// over exactly once, after which the runner is idle again.
    pub fn take_output(&mut self) -> Option<JobOutput> {
        let output = self.output.take();
        if output.is_some() {
            self.state = JobStatus::Idle;
        }
        output
    }

    /// Message of the last failed job, if any.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    fn finish(&mut self, reply: WorkerReply) {
        match reply {
            WorkerReply::Finished(output) => {
                self.output = Some(*output);
                self.state = JobStatus::Succeeded;
            }
            WorkerReply::Failed(message) => {
                self.last_error = Some(message);
                self.state = JobStatus::Failed;
            }
            WorkerReply::Cancelled => {
                self.state = JobStatus::Cancelled;
            }
        }
        self.reply_rx = None;
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

/// Execute a viewshed job. Returns `Ok(None)` when cancelled.
fn run_viewshed_job(
    dem: &Raster<f64>,
    params: &ViewshedJobParams,
    cancel: &AtomicBool,
) -> Result<Option<JobOutput>> {
    let (rows, cols) = dem.shape();
    let mut counts = dem.with_same_meta::<f64>(rows, cols);
    let mut wedges = FeatureCollection::new();
    let mut full_wedges = FeatureCollection::new();
    let mut skipped = Vec::new();

    let mut vs_params = RadialViewshedParams {
        inner_radius: params.inner_radius,
        outer_radius: params.outer_radius,
        start_bearing: params.start_bearing,
        end_bearing: params.end_bearing,
        observer_offset: params.observer_offset,
        target_offset: 0.0,
        curvature: params.curvature,
        ..Default::default()
    };

    for (i, observer) in params.observers.iter().enumerate() {
        if cancel.load(Ordering::Relaxed) {
            return Ok(None);
        }

        vs_params.observer = *observer;
        let vs = match radial_viewshed(dem, &vs_params) {
            Ok(vs) => vs,
            Err(Error::IndexOutOfBounds { .. }) | Err(Error::Algorithm(_)) => {
                skipped.push(i);
                continue;
            }
            Err(e) => return Err(e),
        };

        for row in 0..rows {
            for col in 0..cols {
                if unsafe { vs.get_unchecked(row, col) } > 0 {
                    let current = unsafe { counts.get_unchecked(row, col) };
                    counts.set(row, col, current + 1.0)?;
                }
            }
        }

        wedges.push(wedge_feature(i, observer, params, false));
        full_wedges.push(wedge_feature(i, observer, params, true));
    }

    Ok(Some(JobOutput {
        viewshed: counts,
        wedges,
        full_wedges,
        skipped_observers: skipped,
    }))
}

fn wedge_feature(
    index: usize,
    observer: &Point<f64>,
    params: &ViewshedJobParams,
    full_circle: bool,
) -> Feature {
    let (start, end) = if full_circle {
        (0.0, 360.0)
    } else {
        (params.start_bearing, params.end_bearing)
    };
    let mask = ring_sector_mask(&RingSectorSpec {
        center: *observer,
        inner_radius: params.inner_radius,
        outer_radius: params.outer_radius,
        start_bearing: start,
        end_bearing: end,
    });

    let kind = if full_circle { "fullwedge" } else { "wedge" };
    let mut feature =
        Feature::new(Geometry::MultiPolygon(mask)).with_id(format!("{kind}-{index}"));
    feature.set_property("radius1", AttributeValue::Float(params.inner_radius));
    feature.set_property("radius2", AttributeValue::Float(params.outer_radius));
    feature.set_property("azimuth1", AttributeValue::Float(start));
    feature.set_property("azimuth2", AttributeValue::Float(end));
    feature.set_property("offseta", AttributeValue::Float(params.observer_offset));
    feature
}

#[cfg(test)]
mod tests {
    use super::*;
    use sightline_core::GeoTransform;

    fn flat_dem(size: usize) -> Arc<Raster<f64>> {
        let mut dem = Raster::filled(size, size, 10.0_f64);
        dem.set_transform(GeoTransform::new(0.0, size as f64, 1.0, -1.0));
        Arc::new(dem)
    }

    fn job(observers: &[(f64, f64)]) -> ViewshedJobParams {
        ViewshedJobParams {
            observers: observers.iter().map(|&(x, y)| Point::new(x, y)).collect(),
            outer_radius: 6.0,
            curvature: false,
            ..Default::default()
        }
    }

    #[test]
    fn test_synchronous_job_succeeds() {
        let mut runner = JobRunner::new(flat_dem(21), ExecutionMode::Synchronous);

        runner.submit(job(&[(10.5, 10.5)])).unwrap();
        assert_eq!(runner.status(), JobStatus::Succeeded);

        let output = runner.take_output().expect("output available");
        assert_eq!(output.viewshed.get(10, 10).unwrap(), 1.0);
        assert_eq!(output.wedges.len(), 1);
        assert_eq!(output.full_wedges.len(), 1);
        assert!(output.skipped_observers.is_empty());

        // handed over exactly once
        assert!(runner.take_output().is_none());
        assert_eq!(runner.status(), JobStatus::Idle);
    }

    #[test]
    fn test_asynchronous_job_completes() {
        let mut runner = JobRunner::new(flat_dem(21), ExecutionMode::Asynchronous);

        runner.submit(job(&[(10.5, 10.5), (5.5, 5.5)])).unwrap();
        assert_eq!(runner.wait(), JobStatus::Succeeded);

        let output = runner.take_output().unwrap();
        assert_eq!(output.wedges.len(), 2);
    }

    #[test]
    fn test_second_submit_while_running_is_busy() {
        let mut runner = JobRunner::new(flat_dem(21), ExecutionMode::Asynchronous);

        runner.submit(job(&[(10.5, 10.5)])).unwrap();
        // no status poll in between: the first job is still booked as running
        assert!(matches!(
            runner.submit(job(&[(5.5, 5.5)])),
            Err(Error::JobBusy)
        ));

        runner.wait();
    }

    #[test]
    fn test_resubmit_after_completion() {
        let mut runner = JobRunner::new(flat_dem(21), ExecutionMode::Synchronous);

        runner.submit(job(&[(10.5, 10.5)])).unwrap();
        let first = runner.take_output().unwrap();

        runner.submit(job(&[(5.5, 5.5)])).unwrap();
        let second = runner.take_output().unwrap();

        assert_eq!(first.wedges.len(), 1);
        assert_eq!(second.wedges.len(), 1);
    }

    #[test]
    fn test_cancel_flag_stops_worker() {
        let dem = flat_dem(21);
        let cancel = AtomicBool::new(true);

        let result = run_viewshed_job(&dem, &job(&[(10.5, 10.5)]), &cancel).unwrap();
        assert!(result.is_none(), "pre-cancelled job produces no output");
    }

    #[test]
    fn test_cancelled_job_reports_no_output() {
        let mut runner = JobRunner::new(flat_dem(21), ExecutionMode::Asynchronous);

        runner.cancel(); // flag is reset on submit; this must not leak
        runner.submit(job(&[(10.5, 10.5)])).unwrap();
        runner.cancel();

        let status = runner.wait();
        assert!(
            matches!(status, JobStatus::Cancelled | JobStatus::Succeeded),
            "terminal status after cancel, got {:?}",
            status
        );
        if status == JobStatus::Cancelled {
            assert!(runner.take_output().is_none());
        }
    }

    #[test]
    fn test_all_observers_skipped() {
        let mut runner = JobRunner::new(flat_dem(21), ExecutionMode::Synchronous);

        runner.submit(job(&[(-50.0, -50.0), (999.0, 999.0)])).unwrap();
        assert_eq!(runner.status(), JobStatus::Succeeded);

        let output = runner.take_output().unwrap();
        assert_eq!(output.skipped_observers, vec![0, 1]);
        assert_eq!(output.wedges.len(), 0);
        assert_eq!(output.viewshed.statistics().mean, Some(0.0));
    }

    #[test]
    fn test_wedge_features_carry_parameters() {
        let mut runner = JobRunner::new(flat_dem(21), ExecutionMode::Synchronous);

        let mut params = job(&[(10.5, 10.5)]);
        params.inner_radius = 2.0;
        params.start_bearing = 45.0;
        params.end_bearing = 135.0;
        runner.submit(params).unwrap();

        let output = runner.take_output().unwrap();
        let wedge = &output.wedges.features[0];
        assert_eq!(
            wedge.get_property("azimuth1"),
            Some(&AttributeValue::Float(45.0))
        );
        assert_eq!(
            wedge.get_property("radius2"),
            Some(&AttributeValue::Float(6.0))
        );

        let full = &output.full_wedges.features[0];
        assert_eq!(
            full.get_property("azimuth2"),
            Some(&AttributeValue::Float(360.0))
        );
    }
}
