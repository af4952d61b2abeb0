//! Fleet scheduler: startup passes, per-identity pipelines and periodic jobs.
//!
//! - `startup_claims()` runs one reward-claim pass before anything else
//! - `provision_all()` drives every identity through provision, account lookup,
//!   supervisor start and the first claim/details round
//! - `start_job()` starts a fixed-rate ticker for one [`JobKind`]
//! - `shutdown()` raises the signal, stops every job and waits for supervisors
//!
//! Each job kind runs in its own [`Lane`]: a private concurrency bound and the
//! set of identities with a pass of that kind still in flight. A tick skips
//! those identities, so a pass stuck in retry neither starves other kinds nor
//! stacks up behind itself.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use secrecy::SecretString;
use tokio::sync::{Mutex, Semaphore, broadcast};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{Instrument, debug, info, warn};

use super::state::SupervisorEvent;
use super::supervisor::ConnectionSupervisor;
use crate::context::FleetContext;
use crate::identity::Identity;
use crate::shutdown::{Cancelled, ShutdownTrigger};

/// How long `shutdown()` waits for supervisors to send their close frames.
const SUPERVISOR_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Recurring fleet-wide passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobKind {
    RewardClaim,
    MedalClaim,
    AccountDetails,
}

impl JobKind {
    pub fn period(&self, ctx: &FleetContext) -> Duration {
        let timing = &ctx.config.timing;
        match self {
            Self::RewardClaim => timing.claim_interval,
            Self::MedalClaim => timing.medal_interval,
            Self::AccountDetails => timing.details_interval,
        }
    }
}

impl JobKind {
    pub const ALL: [JobKind; 3] = [Self::RewardClaim, Self::MedalClaim, Self::AccountDetails];
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::RewardClaim => "reward_claim",
            Self::MedalClaim => "medal_claim",
            Self::AccountDetails => "account_details",
        };
        write!(f, "{s}")
    }
}

/// Concurrency bound and in-flight identities for one job kind.
#[derive(Clone)]
struct Lane {
    limiter: Arc<Semaphore>,
    in_flight: Arc<StdMutex<HashSet<usize>>>,
}

impl Lane {
    fn new(width: usize) -> Self {
        Self {
            limiter: Arc::new(Semaphore::new(width.max(1))),
            in_flight: Arc::new(StdMutex::new(HashSet::new())),
        }
    }

    /// Reserve `index` for one pass. `None` while its previous pass still runs.
    fn reserve(&self, index: usize) -> Option<LaneSlot> {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        in_flight.insert(index).then(|| LaneSlot {
            in_flight: Arc::clone(&self.in_flight),
            index,
        })
    }

    fn busy(&self) -> usize {
        self.in_flight.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

/// Releases its identity when the pass finishes or is aborted.
struct LaneSlot {
    in_flight: Arc<StdMutex<HashSet<usize>>>,
    index: usize,
}

impl Drop for LaneSlot {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.index);
    }
}

/// Drives the whole fleet.
pub struct Scheduler {
    ctx: Arc<FleetContext>,
    identities: Vec<Arc<Identity>>,
    jobs: Mutex<HashMap<JobKind, JoinHandle<()>>>,
    supervisors: Mutex<Vec<JoinHandle<()>>>,
    trigger: ShutdownTrigger,
    lanes: HashMap<JobKind, Lane>,
}

impl Scheduler {
    pub fn new(
        ctx: FleetContext,
        identities: Vec<Arc<Identity>>,
        trigger: ShutdownTrigger,
    ) -> Self {
        let lanes = JobKind::ALL
            .into_iter()
            .map(|kind| (kind, Lane::new(ctx.config.max_concurrency)))
            .collect();
        Self {
            ctx: Arc::new(ctx),
            identities,
            jobs: Mutex::new(HashMap::new()),
            supervisors: Mutex::new(Vec::new()),
            trigger,
            lanes,
        }
    }

    fn lane(&self, kind: JobKind) -> Lane {
        self.lanes
            .get(&kind)
            .cloned()
            .unwrap_or_else(|| Lane::new(self.ctx.config.max_concurrency))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SupervisorEvent> {
        self.ctx.subscribe()
    }

    pub fn context(&self) -> &Arc<FleetContext> {
        &self.ctx
    }

    /// Full startup order: immediate claims, claim ticker, pipelines, then the
    /// details and medal tickers. Returns once every pipeline has finished its
    /// first round; supervisors and tickers keep running.
    pub async fn run(&self) {
        self.startup_claims().await;
        self.start_job(JobKind::RewardClaim).await;
        self.provision_all().await;
        self.start_job(JobKind::AccountDetails).await;
        self.start_job(JobKind::MedalClaim).await;
    }

    /// One reward-claim pass over identities that already hold a token.
    pub async fn startup_claims(&self) {
        fan_out(
            Arc::clone(&self.ctx),
            self.identities.clone(),
            self.lane(JobKind::RewardClaim),
            JobKind::RewardClaim,
        )
        .await;
    }

    /// Run every identity's pipeline concurrently and wait for all of them.
    pub async fn provision_all(&self) {
        let mut pipelines = JoinSet::new();
        for identity in &self.identities {
            let ctx = Arc::clone(&self.ctx);
            let span = identity.span();
            let identity = Arc::clone(identity);
            pipelines.spawn(async move { run_pipeline(ctx, identity).await }.instrument(span));
        }

        while let Some(joined) = pipelines.join_next().await {
            match joined {
                Ok(Ok(handle)) => self.supervisors.lock().await.push(handle),
                Ok(Err(Cancelled)) => debug!("Pipeline stopped by shutdown"),
                Err(e) => warn!("Pipeline task failed: {}", e),
            }
        }
    }

    /// Start the fixed-rate ticker for `kind`. A running ticker is left alone.
    pub async fn start_job(&self, kind: JobKind) {
        let mut jobs = self.jobs.lock().await;
        if jobs.contains_key(&kind) {
            return;
        }
        let period = kind.period(&self.ctx);
        let handle = tokio::spawn(run_periodic(
            Arc::clone(&self.ctx),
            self.identities.clone(),
            self.lane(kind),
            kind,
            period,
        ));
        info!(job = %kind, period_secs = period.as_secs(), "Started periodic job");
        jobs.insert(kind, handle);
    }

    pub async fn running_jobs(&self) -> Vec<JobKind> {
        self.jobs.lock().await.keys().copied().collect()
    }

    /// Raise the shutdown signal, cancel periodic jobs and drain supervisors.
    pub async fn shutdown(&self) {
        self.trigger.trigger();

        for (kind, handle) in self.jobs.lock().await.drain() {
            handle.abort();
            debug!(job = %kind, "Stopped periodic job");
        }

        let supervisors: Vec<_> = self.supervisors.lock().await.drain(..).collect();
        let drained = tokio::time::timeout(SUPERVISOR_DRAIN_TIMEOUT, async {
            for handle in supervisors {
                let _ = handle.await;
            }
        })
        .await;
        if drained.is_err() {
            warn!("Supervisors did not stop within {:?}", SUPERVISOR_DRAIN_TIMEOUT);
        }

        self.ctx.store.persist_logged().await;
    }
}

/// Provision, resolve the account id, start the supervisor, then run the first
/// medal/claim/details round and make sure resources are assigned.
async fn run_pipeline(
    ctx: Arc<FleetContext>,
    identity: Arc<Identity>,
) -> Result<JoinHandle<()>, Cancelled> {
    let session = Arc::new(ctx.provisioner.provision(&identity).await?);
    ctx.rewards
        .fetch_account_id(&identity, &session.token)
        .await?;

    let supervisor = ConnectionSupervisor::new(
        Arc::clone(&identity),
        Arc::clone(&session),
        Arc::clone(&ctx.store),
        ctx.assigner.clone(),
        ctx.events.clone(),
        ctx.config.endpoints.ws_url.clone(),
        ctx.config.timing.heartbeat_interval,
        ctx.config.timing.reconnect_delay,
        ctx.shutdown.clone(),
    )
    .spawn();

    tokio::join!(
        ctx.rewards.claim_medals(&identity, &session.token),
        ctx.rewards.check_and_claim_reward(&identity, &session.token),
        ctx.rewards.fetch_account_details(&identity, &session.token),
    );

    ctx.assigner.ensure_resources(&identity.address).await;
    Ok(supervisor)
}

async fn run_periodic(
    ctx: Arc<FleetContext>,
    identities: Vec<Arc<Identity>>,
    lane: Lane,
    kind: JobKind,
    period: Duration,
) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut ticks = JoinSet::new();

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                debug!(job = %kind, busy = lane.busy(), "Tick");
                ticks.spawn(fan_out(
                    Arc::clone(&ctx),
                    identities.clone(),
                    lane.clone(),
                    kind,
                ));
            }
            Some(_) = ticks.join_next(), if !ticks.is_empty() => {}
            _ = ctx.shutdown.triggered() => break,
        }
    }

    ticks.shutdown().await;
}

/// Run `kind` once for every identity holding a token, bounded by the lane.
/// Identities whose previous pass of `kind` has not finished are skipped.
async fn fan_out(ctx: Arc<FleetContext>, identities: Vec<Arc<Identity>>, lane: Lane, kind: JobKind) {
    let mut set = JoinSet::new();
    for identity in identities {
        let Some(token) = ctx.store.token(&identity.address).await else {
            continue;
        };
        let Some(slot) = lane.reserve(identity.index) else {
            debug!(job = %kind, address = %identity.address, "Previous pass still running, skipped");
            continue;
        };
        let ctx = Arc::clone(&ctx);
        let limiter = Arc::clone(&lane.limiter);
        let span = identity.span();
        set.spawn(
            async move {
                let _slot = slot;
                let Ok(_permit) = limiter.acquire_owned().await else {
                    return;
                };
                let token = SecretString::from(token);
                match kind {
                    JobKind::RewardClaim => {
                        ctx.rewards.check_and_claim_reward(&identity, &token).await;
                    }
                    JobKind::MedalClaim => {
                        ctx.rewards.claim_medals(&identity, &token).await;
                    }
                    JobKind::AccountDetails => {
                        ctx.rewards.fetch_account_details(&identity, &token).await;
                    }
                }
            }
            .instrument(span),
        );
    }
    while set.join_next().await.is_some() {}
}
