//! Parallel search driver.
//!
//! One thread per participant. Rank 0 is the master and doubles as
//! hub 0; every `cluster_size` ranks start a new cluster whose first
//! rank is its hub; all remaining ranks are workers. Each participant
//! runs a single scheduler loop over one mailbox; work moves as
//! serialized sub-trees, incumbents fan out over a binary multicast
//! tree, and the master detects quiescence with a pause/snapshot
//! protocol.

use std::{sync::Arc, thread, time};

use crate::{
    broker::{IndexLadder, SearchReport, SerialBroker, INDEX_MAX},
    buf::Encoded,
    comm::{self, Comm, Message, Tag},
    knowledge::{Model, Prototype, Registry, TYPE_NODE, TYPE_SOLUTION, TYPE_SUBTREE},
    msg::Reporter,
    node::{TreeNode, NO_PARENT},
    params::Params,
    pool::{SolutionPool, SubTreePool},
    stats::{ExitStatus, SearchStats, Timer},
    strategy::SearchStrategy,
    subtree::{SubTree, TreeConfig, WorkContext},
    Error, Result, OBJ_MAX, QUALITY_TOL,
};

/// Role a rank plays in the hierarchy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Role {
    Master,
    Hub,
    Worker,
}

/// Cluster arithmetic shared by every rank.
#[derive(Clone, Copy, Debug)]
struct Topology {
    n: usize,
    hub_num: usize,
    cluster_size: usize,
}

impl Topology {
    /// Shrink the requested hub count until the last cluster holds at
    /// least two ranks, the way clusters are actually dealt out.
    fn new(n: usize, requested_hubs: i64) -> Topology {
        let mut hub_num = (requested_hubs.max(1) as usize).min(n);
        loop {
            let mut cluster_size = 1;
            while cluster_size * hub_num < n {
                cluster_size += 1;
            }
            if hub_num == 1 || n - cluster_size * (hub_num - 1) > 1 {
                break Topology {
                    n,
                    hub_num,
                    cluster_size,
                };
            }
            hub_num -= 1;
        }
    }

    fn cluster_of(&self, rank: usize) -> usize {
        rank / self.cluster_size
    }

    fn hub_of(&self, rank: usize) -> usize {
        self.cluster_of(rank) * self.cluster_size
    }

    fn role_of(&self, rank: usize) -> Role {
        if rank == 0 {
            Role::Master
        } else if rank % self.cluster_size == 0 {
            Role::Hub
        } else {
            Role::Worker
        }
    }

    fn cluster_ranks(&self, cluster: usize) -> Vec<usize> {
        let start = cluster * self.cluster_size;
        let end = ((cluster + 1) * self.cluster_size).min(self.n);
        (start..end).collect()
    }

    fn hub_ranks(&self) -> Vec<usize> {
        (0..self.n).step_by(self.cluster_size).collect()
    }

    /// Index bands: master owns the low quarter, each hub a disjoint
    /// band above it, each worker a sub-band in the upper half of its
    /// hub's band.
    fn index_band(&self, rank: usize) -> (i64, i64) {
        let master_r = INDEX_MAX / 4;
        let hub_r = (INDEX_MAX / (4 * self.hub_num as i64)) * 3;
        let worker_r = hub_r / (2 * self.cluster_size as i64);

        match self.role_of(rank) {
            Role::Master => (0, master_r + hub_r / 2),
            Role::Hub => {
                let low = master_r + (self.cluster_of(rank) as i64) * hub_r + 1;
                (low, low + hub_r / 2)
            }
            Role::Worker => {
                let cluster_off = (rank % self.cluster_size) as i64;
                let hub_low = master_r + (self.cluster_of(rank) as i64) * hub_r + 1;
                let hub_up = hub_low + hub_r / 2;
                let low = hub_up + worker_r * cluster_off + 1;
                (low, low + worker_r)
            }
        }
    }

    fn master_index_batch(&self) -> i64 {
        let (_, master_up) = self.index_band(0);
        master_up / (self.hub_num as i64 * 3)
    }

    fn hub_index_batch(&self) -> i64 {
        let hub_r = (INDEX_MAX / (4 * self.hub_num as i64)) * 3;
        hub_r / (2 * self.cluster_size as i64 * 3)
    }
}

/// Parallel broker. Construct, register decode prototypes, then call
/// [ParBroker::search] once.
pub struct ParBroker {
    params: Params,
    model: Arc<dyn Model>,
    registry: Registry,
    reporter: Reporter,
}

impl ParBroker {
    /// Create a broker around a fully set-up model. `process_num <= 0`
    /// picks the machine's logical core count.
    pub fn new(model: Arc<dyn Model>, mut params: Params) -> Result<ParBroker> {
        if params.process_num <= 0 {
            params.process_num = num_cpus::get() as i64;
        }
        let mut reporter = Reporter::new("master", params.msg_level);
        if params.log_file_level > 0 {
            reporter.set_log_file(&params.log_file, params.log_file_level)?;
        }
        Ok(ParBroker {
            params,
            model,
            registry: Registry::new(),
            reporter,
        })
    }

    /// Register a decode prototype; the node and solution types must
    /// be registered before the search starts.
    pub fn register(&mut self, tag: &str, proto: Box<dyn Prototype>) {
        self.registry.register(tag, proto);
    }

    /// Run the search across the configured number of participants.
    pub fn search(self) -> Result<SearchReport> {
        let n = self.params.process_num as usize;
        if n < 2 {
            // Degenerate launch; no peers to coordinate with.
            let mut broker = SerialBroker::new(Arc::clone(&self.model), self.params)?;
            return broker.search();
        }

        self.model.preprocess()?;

        let topo = Topology::new(n, self.params.hub_num);
        let registry = Arc::new(self.registry);
        let mut mesh = comm::full_mesh(n);
        let master_comm = mesh.remove(0);

        let mut handles = vec![];
        for (off, comm) in mesh.into_iter().enumerate() {
            let rank = off + 1;
            let process = Process::new(
                rank,
                comm,
                topo,
                self.params.clone(),
                Arc::clone(&registry),
                Arc::clone(&self.model),
                &self.reporter,
            );
            let builder = thread::Builder::new().name(format!("parsearch-{}", rank));
            let handle = err_at!(ThreadFail, builder.spawn(move || process.run()))?;
            handles.push(handle);
        }

        let master = Process::new(
            0,
            master_comm,
            topo,
            self.params.clone(),
            Arc::clone(&registry),
            Arc::clone(&self.model),
            &self.reporter,
        );
        let report = master.run_master();

        for handle in handles {
            match handle.join() {
                Ok(res) => res?,
                Err(err) => return err_at!(ThreadFail, msg: "{:?}", err),
            }
        }

        self.model.postprocess()?;
        report
    }
}

/// Per-participant engine state and scheduler.
struct Process {
    rank: usize,
    role: Role,
    comm: Comm,
    topo: Topology,
    params: Params,
    registry: Arc<Registry>,
    model: Arc<dyn Model>,
    reporter: Reporter,

    tree_config: TreeConfig,
    indices: IndexLadder,
    solutions: SolutionPool,
    stats: SearchStats,
    working: Option<SubTree>,
    tree_pool: SubTreePool,

    incumbent_value: f64,
    incumbent_id: usize,

    send_count: i64,
    recv_count: i64,
    work_quality: f64,
    work_quantity: f64,

    node_mem_size: usize,
    force_terminate: bool,
    force_cleaned: bool,
    force_relayed: bool,
    forced_status: Option<ExitStatus>,
    block_term_check: bool,

    // Hub (and master-as-hub) state over its cluster, indexed by
    // cluster offset; slot 0 is the hub itself.
    worker_reported: Vec<bool>,
    worker_processed: Vec<u64>,
    worker_qualities: Vec<f64>,
    worker_quantities: Vec<f64>,
    cluster_processed: u64,
    cluster_quality: f64,
    cluster_quantity: f64,
    cluster_send_count: i64,
    cluster_recv_count: i64,
    hub_do_balance: i64,
    block_hub_report: bool,

    // Master state over hubs, indexed by cluster number.
    hub_reported: Vec<bool>,
    hub_processed: Vec<u64>,
    hub_qualities: Vec<f64>,
    hub_quantities: Vec<f64>,
    system_processed: u64,
    system_quality: f64,
    system_quantity: f64,
    system_send_count: i64,
    system_recv_count: i64,
    master_do_balance: i64,

    // Worker state.
    block_worker_report: bool,
    block_ask_for_work: bool,
    last_ask: Option<Timer>,
}

impl Process {
    fn new(
        rank: usize,
        comm: Comm,
        topo: Topology,
        params: Params,
        registry: Arc<Registry>,
        model: Arc<dyn Model>,
        reporter: &Reporter,
    ) -> Process {
        let role = topo.role_of(rank);
        let (level, name) = match role {
            Role::Master => (params.msg_level, "master".to_string()),
            Role::Hub => (params.hub_msg_level, format!("hub-{}", rank)),
            Role::Worker => (params.worker_msg_level, format!("worker-{}", rank)),
        };
        let reporter = reporter.derive(&name, level);

        let (low, up) = topo.index_band(rank);
        let cluster_len = topo.cluster_ranks(topo.cluster_of(rank)).len();
        let tree_config = TreeConfig::from(&params);
        let sol_limit = params.sol_limit.max(1) as usize;
        let strategy = tree_config.strategy;

        Process {
            rank,
            role,
            comm,
            topo,
            params,
            registry,
            model,
            reporter,

            tree_config,
            indices: IndexLadder::new(low, up),
            solutions: SolutionPool::new(sol_limit),
            stats: SearchStats::default(),
            working: None,
            tree_pool: SubTreePool::new(strategy),

            incumbent_value: OBJ_MAX,
            incumbent_id: 0,

            send_count: 0,
            recv_count: 0,
            work_quality: OBJ_MAX,
            work_quantity: 0.0,

            node_mem_size: 0,
            force_terminate: false,
            force_cleaned: false,
            force_relayed: false,
            forced_status: None,
            block_term_check: true,

            worker_reported: vec![false; cluster_len],
            worker_processed: vec![0; cluster_len],
            worker_qualities: vec![OBJ_MAX; cluster_len],
            worker_quantities: vec![0.0; cluster_len],
            cluster_processed: 0,
            cluster_quality: OBJ_MAX,
            cluster_quantity: 0.0,
            cluster_send_count: 0,
            cluster_recv_count: 0,
            hub_do_balance: 0,
            block_hub_report: false,

            hub_reported: vec![false; topo.hub_num],
            hub_processed: vec![0; topo.hub_num],
            hub_qualities: vec![OBJ_MAX; topo.hub_num],
            hub_quantities: vec![0.0; topo.hub_num],
            system_processed: 0,
            system_quality: OBJ_MAX,
            system_quantity: 0.0,
            system_send_count: 0,
            system_recv_count: 0,
            master_do_balance: 0,

            block_worker_report: false,
            block_ask_for_work: false,
            last_ask: None,
        }
    }

    fn my_hub(&self) -> usize {
        self.topo.hub_of(self.rank)
    }

    fn cluster_off(&self, rank: usize) -> usize {
        rank % self.topo.cluster_size
    }

    fn hub_works(&self) -> bool {
        self.params.hub_works()
    }

    fn run(mut self) -> Result<()> {
        let res = match self.role {
            Role::Hub => self.hub_main(),
            Role::Worker => self.worker_main(),
            Role::Master => err_at!(Fatal, msg: "master runs through run_master"),
        };
        if let Err(err) = &res {
            self.reporter.log(0, &format!("participant failed: {}", err));
            // Best effort: surface the failure and unblock the
            // master's final gather.
            self.comm.send_control(0, Tag::ForceTerm).ok();
            self.send_final_stats().ok();
        }
        res
    }
}

// Message bodies.
impl Process {
    fn pack_status(&self) -> Encoded {
        let mut buf = Encoded::new("status");
        buf.write_scalar(self.stats.nodes_processed);
        buf.write_scalar(self.work_quality);
        buf.write_scalar(self.work_quantity);
        buf.write_scalar(self.send_count);
        buf.write_scalar(self.recv_count);
        buf
    }

    fn pack_ask(receiver: usize, workload: f64) -> Encoded {
        let mut buf = Encoded::new("ask");
        buf.write_scalar(receiver as u64);
        buf.write_scalar(workload);
        buf
    }

    fn unpack_ask(body: &mut Encoded) -> Result<(usize, f64)> {
        let receiver: u64 = body.read_scalar()?;
        let workload: f64 = body.read_scalar()?;
        Ok((receiver as usize, workload))
    }

    fn pack_node(node: &TreeNode) -> Result<Encoded> {
        let mut buf = Encoded::new(TYPE_NODE);
        node.encode(&mut buf)?;
        Ok(buf)
    }

    fn unpack_node(&self, body: &mut Encoded) -> Result<TreeNode> {
        let (mut node, _) = TreeNode::decode(body, &self.registry)?;
        node.parent = NO_PARENT;
        node.children.clear();
        Ok(node)
    }
}

// Workload accounting.
impl Process {
    fn update_workload(&mut self) {
        self.work_quality = OBJ_MAX;
        self.work_quantity = 0.0;

        if let Some(st) = self.working.as_mut() {
            st.calculate_quality();
        }
        if let Some(st) = self.working.as_ref() {
            self.work_quality = st.quality();
            self.work_quantity += st.num_nodes() as f64;
        }
        let pooled = self.tree_pool.best_quality();
        if pooled < self.work_quality {
            self.work_quality = pooled;
        }
        self.work_quantity += self.tree_pool.total_nodes() as f64;

        // rho blends quantity into the quality metric; 0 scores by
        // quality alone.
        if self.params.rho > 0.0 && self.work_quality < OBJ_MAX {
            self.work_quality += self.params.rho * self.work_quantity;
        }
    }

    /// Re-derive the cluster aggregate and fold this participant's own
    /// message counters into the cluster ledger.
    fn refresh_cluster_status(&mut self) {
        let off = self.cluster_off(self.rank);
        self.worker_processed[off] = self.stats.nodes_processed;
        self.worker_qualities[off] = self.work_quality;
        self.worker_quantities[off] = self.work_quantity;

        self.cluster_processed = self.worker_processed.iter().sum();
        self.cluster_quantity = self.worker_quantities.iter().sum();
        self.cluster_quality = self
            .worker_qualities
            .iter()
            .fold(OBJ_MAX, |acc, q| if *q < acc { *q } else { acc });

        self.cluster_send_count += self.send_count;
        self.cluster_recv_count += self.recv_count;
        self.send_count = 0;
        self.recv_count = 0;
    }

    /// Master: roll the cluster ledger up into the system ledger.
    fn refresh_sys_status(&mut self) {
        self.refresh_cluster_status();
        self.hub_processed[0] = self.cluster_processed;
        self.hub_qualities[0] = self.cluster_quality;
        self.hub_quantities[0] = self.cluster_quantity;

        self.system_processed = self.hub_processed.iter().sum();
        self.system_quantity = self.hub_quantities.iter().sum();
        self.system_quality = self
            .hub_qualities
            .iter()
            .fold(OBJ_MAX, |acc, q| if *q < acc { *q } else { acc });

        self.system_send_count += self.cluster_send_count;
        self.system_recv_count += self.cluster_recv_count;
        self.cluster_send_count = 0;
        self.cluster_recv_count = 0;
    }

    /// Fold a worker status report into the cluster view. Counts come
    /// in as deltas, quantities as absolutes.
    fn hub_update_clu_status(&mut self, from: usize, body: &mut Encoded) -> Result<()> {
        let off = self.cluster_off(from);
        let processed: u64 = body.read_scalar()?;
        let quality: f64 = body.read_scalar()?;
        let quantity: f64 = body.read_scalar()?;
        let sends: i64 = body.read_scalar()?;
        let recvs: i64 = body.read_scalar()?;

        self.worker_reported[off] = true;
        self.worker_processed[off] = processed;
        self.worker_qualities[off] = quality;
        self.worker_quantities[off] = quantity;
        self.cluster_send_count += sends;
        self.cluster_recv_count += recvs;
        Ok(())
    }

    /// Fold a hub report into the system view.
    fn master_update_sys_status(&mut self, from: usize, body: &mut Encoded) -> Result<()> {
        let hub = self.topo.cluster_of(from);
        let processed: u64 = body.read_scalar()?;
        let quality: f64 = body.read_scalar()?;
        let quantity: f64 = body.read_scalar()?;
        let sends: i64 = body.read_scalar()?;
        let recvs: i64 = body.read_scalar()?;

        self.hub_reported[hub] = true;
        self.hub_processed[hub] = processed;
        self.hub_qualities[hub] = quality;
        self.hub_quantities[hub] = quantity;
        self.system_send_count += sends;
        self.system_recv_count += recvs;
        Ok(())
    }

    /// Report this worker's status to its hub. The counters reset on
    /// every report, so reports carry deltas.
    fn worker_report_status(&mut self, tag: Tag) -> Result<()> {
        let body = self.pack_status();
        self.comm.send(self.my_hub(), tag, body)?;
        self.send_count = 0;
        self.recv_count = 0;
        Ok(())
    }

    /// Report this hub's cluster totals to the master and reset the
    /// cluster delta counters.
    fn hub_report_status(&mut self, tag: Tag) -> Result<()> {
        let mut buf = Encoded::new("status");
        buf.write_scalar(self.cluster_processed);
        buf.write_scalar(self.cluster_quality);
        buf.write_scalar(self.cluster_quantity);
        buf.write_scalar(self.cluster_send_count);
        buf.write_scalar(self.cluster_recv_count);
        self.comm.send(0, tag, buf)?;
        self.cluster_send_count = 0;
        self.cluster_recv_count = 0;
        Ok(())
    }
}

// Incumbent propagation.
impl Process {
    /// Forward the incumbent to this rank's two children in the
    /// multicast tree rooted at the discoverer.
    fn send_incumbent(&mut self) -> Result<()> {
        let n = self.topo.n;
        let my_seq = (self.rank + n - self.incumbent_id) % n;

        for seq in [2 * my_seq + 1, 2 * my_seq + 2].iter() {
            if *seq < n {
                let to = (seq + self.incumbent_id) % n;
                let mut buf = Encoded::new("incumbent");
                buf.write_scalar(self.incumbent_value);
                buf.write_scalar(self.incumbent_id as u64);
                self.comm.send(to, Tag::IncumbentTwo, buf)?;
                self.send_count += 1;
            }
        }
        Ok(())
    }

    /// Apply a received incumbent; returns whether it was adopted and
    /// should be forwarded. Ordered by (quality, origin id) so every
    /// participant converges on the same winner.
    fn unpack_set_incumbent(&mut self, body: &mut Encoded) -> Result<bool> {
        let value: f64 = body.read_scalar()?;
        let id = body.read_scalar::<u64>()? as usize;

        if id == self.rank {
            return Ok(false);
        }
        let accept = value < self.incumbent_value
            || (value == self.incumbent_value && id < self.incumbent_id);
        if accept {
            self.incumbent_value = value;
            self.incumbent_id = id;
        }
        Ok(accept)
    }

    /// Adopt a locally discovered solution and start a broadcast.
    fn publish_local_incumbent(&mut self) -> Result<()> {
        let best = self.solutions.best_quality();
        if best < self.incumbent_value {
            self.incumbent_value = best;
            self.incumbent_id = self.rank;
            self.send_incumbent()?;
            self.reporter.log(1, &format!("new incumbent {:.6}", best));
        }
        Ok(())
    }
}

// Message dispatch.
impl Process {
    fn process_messages(&mut self, mut msg: Message) -> Result<()> {
        self.recv_count += 1;
        match msg.tag {
            // Master side.
            Tag::HubPeriodReport => {
                self.master_update_sys_status(msg.from, &mut msg.body)?;
            }
            Tag::TellMasterRecv => {
                self.master_do_balance -= 1;
            }
            Tag::HubAskIndices => {
                self.master_send_indices(msg.from)?;
            }

            // Hub side.
            Tag::WorkerNeedWork => {
                self.hub_satisfy_worker_request(msg.from)?;
            }
            Tag::AskHubShare => {
                self.hubs_share_work(&mut msg.body)?;
            }
            Tag::AskHubPause => {
                self.recv_count -= 1;
                self.block_term_check = false;
            }
            Tag::TellHubRecv => {
                self.hub_do_balance -= 1;
            }
            Tag::WorkerStatus => {
                self.hub_update_clu_status(msg.from, &mut msg.body)?;
                self.block_hub_report = false;
            }
            Tag::WorkerAskIndices => {
                self.hub_send_indices(msg.from)?;
            }

            // Worker side.
            Tag::AskDonate => {
                let (receiver, load) = Self::unpack_ask(&mut msg.body)?;
                self.donate_work(receiver, load, Tag::SubTree)?;
                self.send_count += 1;
            }
            Tag::AskDonateToHub => {
                let (receiver, load) = Self::unpack_ask(&mut msg.body)?;
                self.donate_work(receiver, load, Tag::SubTreeByMaster)?;
                self.send_count += 1;
            }
            Tag::AskDonateToWorker => {
                let (receiver, load) = Self::unpack_ask(&mut msg.body)?;
                self.donate_work(receiver, load, Tag::SubTreeByWorker)?;
                self.send_count += 1;
            }
            Tag::AskPause => {
                self.recv_count -= 1;
                self.block_term_check = false;
            }
            Tag::SubTree => {
                let got = self.receive_subtree(&mut msg.body)?;
                self.comm.send_control(self.my_hub(), Tag::TellHubRecv)?;
                self.send_count += 1;
                if got {
                    self.block_worker_report = false;
                    self.block_ask_for_work = false;
                }
            }
            Tag::SubTreeByWorker => {
                let got = self.receive_subtree(&mut msg.body)?;
                if got {
                    self.block_worker_report = false;
                    self.block_ask_for_work = false;
                }
            }
            Tag::SubTreeByMaster => match self.role {
                Role::Master => {
                    self.hub_allocate_donation(&mut msg.body)?;
                    self.master_do_balance -= 1;
                }
                Role::Hub => {
                    let got = self.hub_allocate_donation(&mut msg.body)?;
                    self.comm.send_control(0, Tag::TellMasterRecv)?;
                    self.send_count += 1;
                    if got {
                        self.block_hub_report = false;
                    }
                }
                Role::Worker => {
                    let got = self.receive_subtree(&mut msg.body)?;
                    if got {
                        self.block_worker_report = false;
                    }
                }
            },

            // Common.
            Tag::IncumbentTwo => {
                if self.unpack_set_incumbent(&mut msg.body)? {
                    self.send_incumbent()?;
                }
            }
            Tag::ForceTerm => {
                self.recv_count -= 1;
                self.force_terminate = true;
                if !msg.body.is_empty() {
                    if let Ok(code) = msg.body.read_scalar::<u8>() {
                        self.forced_status = Some(forced_status_from_wire(code));
                    }
                }
            }

            tag => {
                return err_at!(Fatal, msg: "rank {} got unexpected {:?}", self.rank, tag)
            }
        }
        Ok(())
    }

    /// Blocking wait for a pause-protocol status report, servicing
    /// index requests inline so a worker blocked on an index refill
    /// cannot deadlock the pause.
    fn wait_term_status(&mut self, tag: Tag) -> Result<Message> {
        loop {
            let msg = self
                .comm
                .wait_any(&[tag, Tag::WorkerAskIndices, Tag::HubAskIndices])?;
            match msg.tag {
                Tag::WorkerAskIndices => {
                    self.recv_count += 1;
                    self.hub_send_indices(msg.from)?;
                }
                Tag::HubAskIndices => {
                    self.recv_count += 1;
                    self.master_send_indices(msg.from)?;
                }
                _ => break Ok(msg),
            }
        }
    }
}

// Work movement.
impl Process {
    /// Donate one sub-tree to `receiver`: the best pooled tree whole,
    /// else a split off the working tree, else an empty body so the
    /// receiver knows the donation failed.
    fn donate_work(&mut self, receiver: usize, _load: f64, tag: Tag) -> Result<()> {
        if let Some(mut st) = self.tree_pool.pop() {
            let body = st.encode()?;
            self.comm.send(receiver, tag, body)?;
            self.reporter
                .log(2, &format!("donated whole tree to {}", receiver));
            return Ok(());
        }

        if let Some(working) = self.working.as_mut() {
            let node_mem = self.node_mem_size.max(1);
            let piece = working.split(node_mem, self.params.large_size.max(1) as usize)?;
            if let Some(mut piece) = piece {
                let body = piece.encode()?;
                self.comm.send(receiver, tag, body)?;
                self.reporter
                    .log(2, &format!("donated split tree to {}", receiver));
                return Ok(());
            }
        }

        self.comm.send(receiver, tag, Encoded::new(TYPE_SUBTREE))
    }

    /// Decode a donated sub-tree into the local pool. Returns false
    /// for the empty "no donation" body, or when this participant has
    /// already been told to quit.
    fn receive_subtree(&mut self, body: &mut Encoded) -> Result<bool> {
        if body.is_empty() || self.force_terminate {
            return Ok(false);
        }
        let mut st = SubTree::decode(body, &self.registry, self.tree_config.clone())?;
        st.calculate_quality();
        self.tree_pool.push(st);
        Ok(true)
    }

    /// Forward a cross-cluster donation to the neediest worker of this
    /// cluster, or keep it when that is the hub itself.
    fn hub_allocate_donation(&mut self, body: &mut Encoded) -> Result<bool> {
        if body.is_empty() {
            return Ok(false);
        }

        let cluster = self.topo.cluster_of(self.rank);
        let mut needy: Option<(f64, usize)> = None;
        for rank in self.topo.cluster_ranks(cluster) {
            if rank == self.rank && !self.hub_works() {
                continue;
            }
            let quantity = self.worker_quantities[self.cluster_off(rank)];
            match needy {
                Some((q, _)) if quantity >= q => (),
                _ => needy = Some((quantity, rank)),
            }
        }

        match needy {
            Some((_, rank)) if rank == self.rank => self.receive_subtree(body),
            Some((_, rank)) => {
                let rest = Encoded::from_parts(TYPE_SUBTREE, body.as_bytes().to_vec());
                self.comm.send(rank, Tag::SubTreeByMaster, rest)?;
                self.send_count += 1;
                Ok(true)
            }
            None => err_at!(Fatal, msg: "no worker to allocate donation to"),
        }
    }

    /// Pick the donor with the best work quality for a worker that
    /// asked for more work, and wire the pair up.
    fn hub_satisfy_worker_request(&mut self, requestor: usize) -> Result<()> {
        let cluster = self.topo.cluster_of(self.rank);
        let mut donor: Option<(f64, usize)> = None;
        for rank in self.topo.cluster_ranks(cluster) {
            if rank == self.rank || rank == requestor {
                continue;
            }
            let off = self.cluster_off(rank);
            if self.worker_quantities[off] <= QUALITY_TOL {
                continue;
            }
            let quality = self.worker_qualities[off];
            match donor {
                Some((q, _)) if quality >= q => (),
                _ => donor = Some((quality, rank)),
            }
        }

        match donor {
            Some((_, rank)) => {
                let body = Self::pack_ask(requestor, 0.0);
                self.comm.send(rank, Tag::AskDonateToWorker, body)?;
                self.send_count += 1;
            }
            None => {
                // Nothing to give; the requestor learns from the
                // empty body.
                self.comm
                    .send(requestor, Tag::SubTreeByWorker, Encoded::new(TYPE_SUBTREE))?;
                self.send_count += 1;
            }
        }
        Ok(())
    }

    /// Master asked this hub's cluster to share work with a peer hub;
    /// choose the most loaded worker (or this hub itself) as donor.
    fn hubs_share_work(&mut self, body: &mut Encoded) -> Result<()> {
        let (receiver, load) = Self::unpack_ask(body)?;

        let cluster = self.topo.cluster_of(self.rank);
        let mut donor: Option<(f64, usize)> = None;
        for rank in self.topo.cluster_ranks(cluster) {
            if rank == self.rank && !self.hub_works() {
                continue;
            }
            let off = self.cluster_off(rank);
            if self.worker_quantities[off] <= QUALITY_TOL {
                continue;
            }
            let quality = self.worker_qualities[off];
            match donor {
                Some((q, _)) if quality >= q => (),
                _ => donor = Some((quality, rank)),
            }
        }

        match donor {
            Some((_, rank)) if rank == self.rank => {
                self.donate_work(receiver, load, Tag::SubTreeByMaster)?;
                self.send_count += 1;
            }
            Some((_, rank)) => {
                let fwd = Self::pack_ask(receiver, load);
                self.comm.send(rank, Tag::AskDonateToHub, fwd)?;
                self.send_count += 1;
            }
            None => {
                self.reporter
                    .log(2, &format!("no donor for hub {}", receiver));
            }
        }
        Ok(())
    }
}

// Load balancing.
impl Process {
    /// Pair quantity- or quality-starved workers with loaded donors in
    /// this cluster and wire each pair up through an AskDonate.
    fn hub_balance_workers(&mut self) -> Result<()> {
        if self.cluster_quantity < self.params.zero_load {
            return Ok(());
        }

        let cluster = self.topo.cluster_of(self.rank);
        let ranks = self.topo.cluster_ranks(cluster);
        let own = self.rank;

        let mut receivers: Vec<(f64, usize)> = vec![];
        let mut donors: Vec<(f64, usize)> = vec![];

        for &rank in ranks.iter().filter(|r| **r != own) {
            let off = self.cluster_off(rank);
            if self.worker_quantities[off] <= self.params.need_work_threshold {
                receivers.push((self.worker_qualities[off], rank));
            }
        }

        if !receivers.is_empty() {
            // Quantity balance.
            for &rank in ranks.iter().filter(|r| **r != own) {
                let off = self.cluster_off(rank);
                if self.worker_quantities[off] > self.params.need_work_threshold {
                    donors.push((self.worker_qualities[off], rank));
                }
            }
        } else {
            // Quality balance around the cluster average.
            let others: Vec<usize> = ranks.iter().copied().filter(|r| *r != own).collect();
            if others.is_empty() {
                return Ok(());
            }
            let avg: f64 = others
                .iter()
                .map(|r| self.worker_qualities[self.cluster_off(*r)])
                .sum::<f64>()
                / (others.len() as f64);

            for rank in others {
                let quality = self.worker_qualities[self.cluster_off(rank)];
                let diff = quality - avg;
                let ratio = (diff / avg).abs();
                if diff < 0.0 && ratio > self.params.donor_threshold {
                    donors.push((quality, rank));
                } else if diff > 0.0 && ratio > self.params.receiver_threshold {
                    receivers.push((quality, rank));
                }
            }
        }

        donors.sort_by(|a, b| crate::cmp_quality(a.0, b.0));
        receivers.sort_by(|a, b| crate::cmp_quality(b.0, a.0));

        for ((_, donor), (load, receiver)) in donors.iter().zip(receivers.iter()) {
            self.hub_do_balance += 1;
            let body = Self::pack_ask(*receiver, *load);
            self.comm.send(*donor, Tag::AskDonate, body)?;
            self.send_count += 1;
        }
        Ok(())
    }

    /// Same classification across hubs, with one level of indirection
    /// through the donor hub.
    fn master_balance_hubs(&mut self) -> Result<()> {
        if self.system_quantity < self.params.zero_load {
            return Ok(());
        }

        let hub_ranks = self.topo.hub_ranks();
        let mut receivers: Vec<(f64, usize)> = vec![];
        let mut donors: Vec<(f64, usize)> = vec![];

        for (hub, &rank) in hub_ranks.iter().enumerate() {
            if self.hub_quantities[hub] < QUALITY_TOL {
                receivers.push((self.hub_qualities[hub], rank));
            }
        }

        if !receivers.is_empty() {
            for (hub, &rank) in hub_ranks.iter().enumerate() {
                if self.hub_quantities[hub] > QUALITY_TOL {
                    donors.push((self.hub_qualities[hub], rank));
                }
            }
        } else {
            let avg: f64 =
                self.hub_qualities.iter().sum::<f64>() / (self.topo.hub_num as f64);
            for (hub, &rank) in hub_ranks.iter().enumerate() {
                let quality = self.hub_qualities[hub];
                let diff = quality - avg;
                let ratio = (diff / (avg + 1.0)).abs();
                if diff < 0.0 && ratio > self.params.donor_threshold {
                    donors.push((quality, rank));
                } else if diff > 0.0 && ratio > self.params.receiver_threshold {
                    receivers.push((quality, rank));
                }
            }
        }

        donors.sort_by(|a, b| crate::cmp_quality(a.0, b.0));
        receivers.sort_by(|a, b| crate::cmp_quality(b.0, a.0));

        for ((_, donor), (load, receiver)) in donors.iter().zip(receivers.iter()) {
            if *donor != self.rank {
                self.master_do_balance += 1;
                let body = Self::pack_ask(*receiver, *load);
                self.comm.send(*donor, Tag::AskHubShare, body)?;
                self.send_count += 1;
            } else {
                // Master is the donor hub; pick its best worker
                // directly.
                let cluster = self.topo.cluster_of(self.rank);
                let mut best: Option<(f64, usize)> = None;
                for rank in self.topo.cluster_ranks(cluster) {
                    if rank == self.rank {
                        continue;
                    }
                    let quality = self.worker_qualities[self.cluster_off(rank)];
                    match best {
                        Some((q, _)) if quality >= q => (),
                        _ => best = Some((quality, rank)),
                    }
                }
                if let Some((_, rank)) = best {
                    self.master_do_balance += 1;
                    let body = Self::pack_ask(*receiver, *load);
                    self.comm.send(rank, Tag::AskDonateToHub, body)?;
                    self.send_count += 1;
                }
            }
        }
        Ok(())
    }
}

// Index traffic.
impl Process {
    fn master_send_indices(&mut self, to: usize) -> Result<()> {
        let reserve = self.params.unit_work_nodes + 10;
        let batch = self.topo.master_index_batch();
        let mut buf = Encoded::new("indices");
        match self.indices.carve(batch, reserve) {
            Some((next, max)) => {
                buf.write_scalar(next);
                buf.write_scalar(max);
            }
            None => {
                buf.write_scalar(-1_i64);
                buf.write_scalar(-1_i64);
            }
        }
        self.comm.send(to, Tag::IndicesFromMaster, buf)?;
        self.send_count += 1;
        Ok(())
    }

    fn hub_send_indices(&mut self, to: usize) -> Result<()> {
        let reserve = self.params.unit_work_nodes + 10;
        let batch = self.topo.hub_index_batch();

        if self.indices.remaining() <= reserve + batch && self.rank != 0 {
            self.hub_ask_recv_indices()?;
        }

        let mut buf = Encoded::new("indices");
        match self.indices.carve(batch, reserve) {
            Some((next, max)) => {
                buf.write_scalar(next);
                buf.write_scalar(max);
            }
            None => {
                buf.write_scalar(-1_i64);
                buf.write_scalar(-1_i64);
            }
        }
        self.comm.send(to, Tag::IndicesFromHub, buf)?;
        self.send_count += 1;
        Ok(())
    }

    fn hub_ask_recv_indices(&mut self) -> Result<()> {
        self.comm.send_control(0, Tag::HubAskIndices)?;
        self.send_count += 1;
        let mut msg = self.comm.wait_tag(Tag::IndicesFromMaster, Some(0))?;
        self.recv_count += 1;
        let next: i64 = msg.body.read_scalar()?;
        let max: i64 = msg.body.read_scalar()?;
        self.indices.refill(next, max)
    }

    fn worker_ask_recv_indices(&mut self) -> Result<()> {
        let hub = self.my_hub();
        self.comm.send_control(hub, Tag::WorkerAskIndices)?;
        self.send_count += 1;
        let mut msg = self.comm.wait_tag(Tag::IndicesFromHub, Some(hub))?;
        self.recv_count += 1;
        let next: i64 = msg.body.read_scalar()?;
        let max: i64 = msg.body.read_scalar()?;
        self.indices.refill(next, max)
    }
}

// Unit work shared by workers and working hubs.
impl Process {
    fn has_work(&self) -> bool {
        self.working.is_some() || !self.tree_pool.is_empty()
    }

    fn do_unit_work(&mut self) -> Result<()> {
        if self.working.is_none() {
            self.working = self.tree_pool.pop();
        }
        let mut unbounded = false;
        if let Some(st) = self.working.as_mut() {
            let incumbent = match self.incumbent_value {
                val if val < OBJ_MAX => Some(val),
                _ => None,
            };
            let mut ctx = WorkContext {
                indices: &mut self.indices,
                solutions: &mut self.solutions,
                incumbent,
                stats: &mut self.stats,
            };
            let out = st.explore_unit_work(
                self.params.unit_work_nodes,
                self.params.unit_work_time,
                true,
                false,
                &mut ctx,
            )?;
            unbounded = matches!(out.status, Some(ExitStatus::Unbounded));

            if st.is_exhausted() {
                self.working = None;
            }
        }

        if unbounded {
            // The whole search is over; let the master fan it out.
            let mut buf = Encoded::new("force");
            buf.write_scalar(forced_status_to_wire(ExitStatus::Unbounded));
            self.comm.send(0, Tag::ForceTerm, buf)?;
        }

        // Swap in a pooled sub-tree when the working one has fallen
        // clearly behind.
        if let (Some(working), Some(top)) = (self.working.as_ref(), self.tree_pool.top()) {
            let cur = working.quality();
            let best = top.quality();
            if cur > best {
                let ratio = (cur - best) / (cur.abs() + 1.0);
                if ratio > self.params.change_work_threshold {
                    let old = self.working.take().unwrap();
                    self.working = self.tree_pool.pop();
                    self.tree_pool.push(old);
                }
            }
        }

        self.publish_local_incumbent()
    }
}

// Ramp-up.
impl Process {
    fn ramp_config(&self) -> TreeConfig {
        let mut config = self.tree_config.clone();
        config.strategy = self
            .params
            .ramp_up_strategy()
            .unwrap_or(SearchStrategy::BestFirst);
        config
    }

    /// Expand seed nodes, then deal the pool out round-robin to
    /// `targets`; with `keep_for_self` every full round keeps one node
    /// in the local sub-tree pool. Ends with FinishInit to every
    /// target.
    fn ramp_and_distribute(
        &mut self,
        mut ramp: SubTree,
        min_nodes: i64,
        targets: &[usize],
        keep_for_self: bool,
    ) -> Result<()> {
        let mut depth = 0;
        {
            let mut ctx = WorkContext {
                indices: &mut self.indices,
                solutions: &mut self.solutions,
                incumbent: None,
                stats: &mut self.stats,
            };
            ramp.ramp_up(min_nodes, 0, &mut depth, None, &mut ctx)?;
        }
        if self.stats.tree_depth < depth {
            self.stats.tree_depth = depth;
        }

        let cycle = targets.len() + if keep_for_self { 1 } else { 0 };
        let mut slot = 0;
        if cycle > 0 {
            while let Some(node) = ramp.take_pooled_node() {
                let pos = slot % cycle;
                if pos < targets.len() {
                    let body = Self::pack_node(&node)?;
                    self.comm.send(targets[pos], Tag::Node, body)?;
                } else {
                    let mut own = SubTree::new(self.tree_config.clone());
                    own.set_root(node);
                    own.calculate_quality();
                    self.tree_pool.push(own);
                }
                slot += 1;
            }
        }

        for &target in targets {
            self.comm.send_control(target, Tag::FinishInit)?;
        }
        Ok(())
    }
}

// Worker scheduler.
impl Process {
    fn worker_main(&mut self) -> Result<()> {
        let ramp_timer = Timer::new();
        let hub = self.my_hub();

        let mut msg = self.comm.wait_tag(Tag::NodeSize, Some(hub))?;
        self.node_mem_size = msg.body.read_scalar::<u64>()? as usize;

        loop {
            let mut msg = self.comm.wait_any(&[Tag::Node, Tag::FinishInit])?;
            match msg.tag {
                Tag::FinishInit => break,
                _ => {
                    let node = self.unpack_node(&mut msg.body)?;
                    let mut st = SubTree::new(self.tree_config.clone());
                    st.set_root(node);
                    st.calculate_quality();
                    self.tree_pool.push(st);
                }
            }
        }
        self.stats.ramp_up_time = ramp_timer.elapsed();
        self.reporter.log(
            1,
            &format!("ramp-up done, {} seed trees", self.tree_pool.len()),
        );

        let ramp_down_timer = Timer::new();
        loop {
            while let Some(msg) = self.comm.poll() {
                self.process_messages(msg)?;
            }

            if self.force_terminate && !self.force_cleaned {
                self.working = None;
                self.tree_pool.clear();
                self.force_cleaned = true;
            }

            if self.block_term_check {
                if self.has_work() && !self.force_terminate {
                    if self.indices.remaining() < self.params.unit_work_nodes + 5 {
                        self.worker_ask_recv_indices()?;
                    }
                    self.do_unit_work()?;
                } else {
                    // Idle; sleep on the mailbox instead of spinning.
                    let idle_timer = Timer::new();
                    let wait = time::Duration::from_secs_f64(self.params.hub_report_period);
                    if let Some(msg) = self.comm.poll_timeout(wait) {
                        self.process_messages(msg)?;
                    }
                    self.stats.idle_time += idle_timer.elapsed();
                }

                if self.send_count != 0 || self.recv_count != 0 || !self.block_worker_report
                {
                    self.update_workload();
                    self.send_count += 1;
                    self.worker_report_status(Tag::WorkerStatus)?;

                    if self.work_quantity < self.params.zero_load {
                        self.block_worker_report = true;
                    }

                    let ask_again = match &self.last_ask {
                        Some(timer) => timer.reached(self.params.worker_ask_period),
                        None => true,
                    };
                    if self.params.intra_cluster_balance
                        && self.work_quantity < self.params.need_work_threshold
                        && (!self.block_ask_for_work || ask_again)
                        && !self.force_terminate
                    {
                        self.comm.send_control(hub, Tag::WorkerNeedWork)?;
                        self.send_count += 1;
                        self.block_ask_for_work = true;
                        self.last_ask = Some(Timer::new());
                    }
                }
            } else {
                // Termination check: report, then obey the verdict.
                self.stats.ramp_down_time = ramp_down_timer.elapsed();
                self.update_workload();
                self.worker_report_status(Tag::WorkerTermStatus)?;

                let mut msg = self.comm.wait_tag(Tag::ContOrTerm, Some(hub))?;
                match msg.body.read_scalar::<u8>()? {
                    b'T' => break,
                    _ => self.block_term_check = true,
                }
            }
        }

        self.finish_non_master()
    }
}

// Hub scheduler.
impl Process {
    fn hub_main(&mut self) -> Result<()> {
        let ramp_timer = Timer::new();
        let cluster = self.topo.cluster_of(self.rank);
        let cluster_ranks = self.topo.cluster_ranks(cluster);
        let worker_ranks: Vec<usize> = cluster_ranks
            .iter()
            .copied()
            .filter(|r| *r != self.rank)
            .collect();

        let mut msg = self.comm.wait_tag(Tag::NodeSize, Some(0))?;
        self.node_mem_size = msg.body.read_scalar::<u64>()? as usize;
        {
            let mut buf = Encoded::new("size");
            buf.write_scalar(self.node_mem_size as u64);
            for &rank in worker_ranks.iter() {
                self.comm.send(rank, Tag::NodeSize, buf.clone())?;
            }
        }

        // Collect the master's seeds into a ramp container.
        let mut ramp = SubTree::new(self.ramp_config());
        loop {
            let mut msg = self.comm.wait_any(&[Tag::Node, Tag::FinishInit])?;
            match msg.tag {
                Tag::FinishInit => break,
                _ => {
                    let node = self.unpack_node(&mut msg.body)?;
                    ramp.seed_node(node);
                }
            }
        }

        self.ramp_and_distribute(
            ramp,
            self.params.hub_init_node_num,
            &worker_ranks,
            self.hub_works(),
        )?;
        self.stats.ramp_up_time = ramp_timer.elapsed();
        self.publish_local_incumbent()?;

        let period = self.params.hub_report_period;
        let mut round = 0_i64;
        loop {
            round += 1;
            let tick = Timer::new();
            while !tick.reached(period) {
                let left = (period - tick.elapsed()).max(0.0);
                match self.comm.poll_timeout(time::Duration::from_secs_f64(left)) {
                    Some(msg) => self.process_messages(msg)?,
                    None => break,
                }
            }

            if self.force_terminate && !self.force_cleaned {
                self.working = None;
                self.tree_pool.clear();
                for &rank in worker_ranks.iter() {
                    self.comm.send_control(rank, Tag::ForceTerm)?;
                }
                self.force_cleaned = true;
            }

            if self.hub_works() && self.has_work() && !self.force_terminate {
                if self.indices.remaining() < self.params.unit_work_nodes + 5
                    && self.rank != 0
                {
                    self.hub_ask_recv_indices()?;
                }
                self.do_unit_work()?;
            }

            self.update_workload();

            // Periodic cluster report; forced every
            // master_report_interval rounds so the master's view never
            // goes completely stale.
            let forced_report = round % self.params.master_report_interval.max(1) == 0;
            if self.cluster_send_count != 0
                || self.cluster_recv_count != 0
                || self.send_count != 0
                || self.recv_count != 0
                || !self.block_hub_report
                || forced_report
            {
                self.send_count += 1;
                self.refresh_cluster_status();
                self.hub_report_status(Tag::HubPeriodReport)?;
                self.block_hub_report = self.cluster_quantity < self.params.zero_load;
            }

            if !self.block_term_check {
                for &rank in worker_ranks.iter() {
                    self.comm.send_control(rank, Tag::AskPause)?;
                }
                for _ in worker_ranks.iter() {
                    let mut msg = self.wait_term_status(Tag::WorkerTermStatus)?;
                    let from = msg.from;
                    self.hub_update_clu_status(from, &mut msg.body)?;
                }
                self.update_workload();
                self.refresh_cluster_status();
                self.hub_report_status(Tag::HubTermStatus)?;

                let mut msg = self.comm.wait_tag(Tag::ContOrTerm, Some(0))?;
                let verdict = msg.body.read_scalar::<u8>()?;
                let mut reply = Encoded::new("verdict");
                reply.write_scalar(verdict);
                for &rank in worker_ranks.iter() {
                    self.comm.send(rank, Tag::ContOrTerm, reply.clone())?;
                }
                if verdict == b'T' {
                    break;
                }
                self.block_term_check = true;
            }

            if self.all_workers_reported()
                && self.hub_do_balance == 0
                && cluster_ranks.len() > 2
                && self.params.intra_cluster_balance
                && !self.force_terminate
            {
                self.hub_balance_workers()?;
            }
        }

        self.finish_non_master()
    }

    fn all_workers_reported(&mut self) -> bool {
        let off = self.cluster_off(self.rank);
        self.worker_reported[off] = true;
        self.worker_reported.iter().all(|b| *b)
    }
}

// Master scheduler.
impl Process {
    fn run_master(mut self) -> Result<SearchReport> {
        let search_timer = Timer::new();
        let ramp_timer = Timer::new();

        // Root node and an estimate of the per-node wire size.
        let root = TreeNode::new(self.indices.next_index()?, self.model.create_root()?);
        self.node_mem_size = {
            let mut probe = Encoded::new(TYPE_NODE);
            root.encode(&mut probe)?;
            (probe.len() * 7) / 2
        };

        let hub_ranks: Vec<usize> = self
            .topo
            .hub_ranks()
            .into_iter()
            .filter(|r| *r != self.rank)
            .collect();
        let cluster_ranks = self.topo.cluster_ranks(0);
        let worker_ranks: Vec<usize> = cluster_ranks
            .iter()
            .copied()
            .filter(|r| *r != self.rank)
            .collect();

        {
            let mut buf = Encoded::new("size");
            buf.write_scalar(self.node_mem_size as u64);
            for &rank in hub_ranks.iter().chain(worker_ranks.iter()) {
                self.comm.send(rank, Tag::NodeSize, buf.clone())?;
            }
        }

        // Phase one: expand the root into seeds, deal them round-robin
        // over the hubs, keeping every full round one seed for the
        // master's own cluster.
        let mut ramp = SubTree::new(self.ramp_config());
        {
            let mut depth = 0;
            let mut ctx = WorkContext {
                indices: &mut self.indices,
                solutions: &mut self.solutions,
                incumbent: None,
                stats: &mut self.stats,
            };
            ramp.ramp_up(
                self.params.master_init_node_num,
                0,
                &mut depth,
                Some(root),
                &mut ctx,
            )?;
            if self.stats.tree_depth < depth {
                self.stats.tree_depth = depth;
            }
        }
        if ramp.num_nodes() == 0 {
            self.reporter.log(1, "ramp-up produced no open nodes");
        }

        let mut kept = vec![];
        let cycle = hub_ranks.len() + 1;
        let mut slot = 0;
        while let Some(node) = ramp.take_pooled_node() {
            let pos = slot % cycle;
            if pos < hub_ranks.len() {
                let body = Self::pack_node(&node)?;
                self.comm.send(hub_ranks[pos], Tag::Node, body)?;
            } else {
                kept.push(node);
            }
            slot += 1;
        }
        for &rank in hub_ranks.iter() {
            self.comm.send_control(rank, Tag::FinishInit)?;
        }
        self.publish_local_incumbent()?;

        // Phase two: expand the kept seeds for the master's own
        // workers. The master itself never processes search nodes
        // after ramp-up.
        let mut own_ramp = SubTree::new(self.ramp_config());
        for node in kept {
            own_ramp.seed_node(node);
        }
        self.ramp_and_distribute(
            own_ramp,
            self.params.hub_init_node_num,
            &worker_ranks,
            false,
        )?;
        self.stats.ramp_up_time = ramp_timer.elapsed();
        self.publish_local_incumbent()?;
        self.reporter.log(
            1,
            &format!("ramp-up done in {:.3}s", self.stats.ramp_up_time),
        );

        // Scheduler.
        let period = self.params.master_balance_period;
        let mut all_workers = false;
        let mut all_hubs = false;
        let mut report_round = 0_i64;

        loop {
            let tick = Timer::new();
            while !tick.reached(period) {
                let left = (period - tick.elapsed()).max(0.0);
                match self.comm.poll_timeout(time::Duration::from_secs_f64(left)) {
                    Some(msg) => self.process_messages(msg)?,
                    None => break,
                }
            }

            if !all_workers {
                let off = self.cluster_off(self.rank);
                self.worker_reported[off] = true;
                all_workers = self.worker_reported.iter().all(|b| *b);
            }
            if !all_hubs {
                self.hub_reported[0] = true;
                all_hubs = self.hub_reported.iter().all(|b| *b);
            }

            self.refresh_sys_status();

            if !self.force_relayed {
                let status = if self.force_terminate {
                    // A participant reported a fatal condition.
                    Some(self.forced_status.unwrap_or(ExitStatus::Unknown))
                } else if search_timer.reached(self.params.time_limit) {
                    Some(ExitStatus::TimeLimit)
                } else if (self.system_processed as i64) >= self.params.node_limit {
                    Some(ExitStatus::NodeLimit)
                } else if (self.solutions.len() as i64) >= self.params.sol_limit {
                    Some(ExitStatus::SolLimit)
                } else {
                    None
                };
                if let Some(status) = status {
                    self.force_all(status)?;
                }
            }

            report_round += 1;
            if report_round % self.params.node_log_interval.max(1) == 0 {
                self.reporter.log(
                    1,
                    &format!(
                        "nodes {}, load {:.2}, sends {}, recvs {}, incumbent {:.6}",
                        self.system_processed,
                        self.system_quantity,
                        self.system_send_count,
                        self.system_recv_count,
                        self.incumbent_value
                    ),
                );
            }

            // Termination detection.
            if all_workers
                && all_hubs
                && self.system_quantity < self.params.zero_load
                && self.system_send_count == self.system_recv_count
            {
                let pre_sys_send = self.system_send_count;

                for &rank in hub_ranks.iter() {
                    self.comm.send_control(rank, Tag::AskHubPause)?;
                }
                for &rank in worker_ranks.iter() {
                    self.comm.send_control(rank, Tag::AskPause)?;
                }

                for _ in worker_ranks.iter() {
                    let mut msg = self.wait_term_status(Tag::WorkerTermStatus)?;
                    let from = msg.from;
                    self.hub_update_clu_status(from, &mut msg.body)?;
                }
                for _ in hub_ranks.iter() {
                    let mut msg = self.wait_term_status(Tag::HubTermStatus)?;
                    let from = msg.from;
                    self.master_update_sys_status(from, &mut msg.body)?;
                }
                self.refresh_sys_status();

                let terminate = self.system_quantity < self.params.zero_load
                    && self.system_send_count == pre_sys_send
                    && self.system_send_count == self.system_recv_count;

                let verdict = if terminate { b'T' } else { b'C' };
                let mut reply = Encoded::new("verdict");
                reply.write_scalar(verdict);
                for &rank in hub_ranks.iter().chain(worker_ranks.iter()) {
                    self.comm.send(rank, Tag::ContOrTerm, reply.clone())?;
                }
                self.reporter.log(
                    1,
                    &format!(
                        "termination check: {}",
                        if terminate { "exit" } else { "continue" }
                    ),
                );
                if terminate {
                    break;
                }
            }

            // Balancing.
            if all_hubs
                && self.master_do_balance == 0
                && self.topo.hub_num > 1
                && self.params.inter_cluster_balance
                && !self.force_terminate
            {
                self.master_balance_hubs()?;
            }
            if all_workers
                && self.hub_do_balance == 0
                && cluster_ranks.len() > 2
                && self.params.intra_cluster_balance
                && !self.force_terminate
            {
                self.hub_balance_workers()?;
            }
        }

        self.finish_master(search_timer)
    }

    /// Broadcast a forced stop with its reason; hubs relay it to their
    /// workers.
    fn force_all(&mut self, status: ExitStatus) -> Result<()> {
        self.force_terminate = true;
        self.force_relayed = true;
        self.forced_status = Some(status);

        let mut buf = Encoded::new("force");
        buf.write_scalar(forced_status_to_wire(status));
        let worker_ranks = self.topo.cluster_ranks(0);
        for rank in self
            .topo
            .hub_ranks()
            .into_iter()
            .chain(worker_ranks.into_iter())
        {
            if rank != self.rank {
                self.comm.send(rank, Tag::ForceTerm, buf.clone())?;
            }
        }
        self.reporter
            .log(1, &format!("forcing termination: {:?}", status));
        Ok(())
    }

    fn finish_master(mut self, search_timer: Timer) -> Result<SearchReport> {
        // Pull in the winning solution when another rank found it.
        if self.incumbent_value < OBJ_MAX && self.incumbent_id != 0 {
            let mut msg = self
                .comm
                .wait_tag(Tag::Incumbent, Some(self.incumbent_id))?;
            let bytes = msg.body.read_bytes()?;
            let mut nested = Encoded::from_parts(TYPE_SOLUTION, bytes);
            let sol = self.registry.decode_solution(&mut nested)?;
            let quality = sol.quality();
            self.solutions.push(quality, sol);
        }

        // Statistics gather.
        let mut merged = self.stats.clone();
        for _ in 1..self.topo.n {
            let mut msg = self.comm.wait_tag(Tag::LoadInfo, None)?;
            let peer = unpack_stats(&mut msg.body)?;
            merged.merge(&peer);
        }
        merged.search_time = search_timer.elapsed();
        merged.ramp_up_time = self.stats.ramp_up_time;

        let exit_status = match self.forced_status {
            Some(status) => status,
            None if self.solutions.is_empty() => ExitStatus::Infeasible,
            None => ExitStatus::Optimal,
        };
        merged.exit_status = exit_status;

        self.reporter.log(
            1,
            &format!(
                "search done status {:?}, nodes {}, best {:.6} from rank {}",
                exit_status, merged.nodes_processed, self.incumbent_value, self.incumbent_id
            ),
        );

        let best_quality = self.solutions.best_quality();
        let solution = self.solutions.take_best().map(|(_, sol)| sol);
        if self.params.print_solution {
            if let Some(sol) = &solution {
                self.reporter.log(0, &sol.render());
            }
        }

        Ok(SearchReport {
            exit_status,
            best_quality,
            solution,
            stats: merged,
            incumbent_rank: self.incumbent_id,
        })
    }
}

// Shutdown path shared by hubs and workers.
impl Process {
    fn finish_non_master(&mut self) -> Result<()> {
        if self.incumbent_value < OBJ_MAX && self.incumbent_id == self.rank {
            if let Some((_, sol)) = self.solutions.best() {
                let mut nested = Encoded::new(TYPE_SOLUTION);
                sol.encode(&mut nested)?;
                let mut buf = Encoded::new(TYPE_SOLUTION);
                buf.write_bytes(nested.as_bytes());
                self.comm.send(0, Tag::Incumbent, buf)?;
            }
        }
        self.send_final_stats()?;
        self.comm.discard_queued();
        Ok(())
    }

    fn send_final_stats(&mut self) -> Result<()> {
        self.stats.nodes_left = self.working.as_ref().map_or(0, |st| st.num_nodes()) as u64
            + self.tree_pool.total_nodes() as u64;
        let body = pack_stats(&self.stats);
        self.comm.send(0, Tag::LoadInfo, body)
    }
}

fn pack_stats(stats: &SearchStats) -> Encoded {
    let mut buf = Encoded::new("stats");
    buf.write_scalar(stats.nodes_processed);
    buf.write_scalar(stats.nodes_branched);
    buf.write_scalar(stats.nodes_discarded);
    buf.write_scalar(stats.nodes_partial);
    buf.write_scalar(stats.nodes_left);
    buf.write_scalar(stats.tree_depth);
    buf.write_scalar(stats.ramp_up_time);
    buf.write_scalar(stats.idle_time);
    buf.write_scalar(stats.ramp_down_time);
    buf
}

fn unpack_stats(body: &mut Encoded) -> Result<SearchStats> {
    let mut stats = SearchStats::default();
    stats.nodes_processed = body.read_scalar()?;
    stats.nodes_branched = body.read_scalar()?;
    stats.nodes_discarded = body.read_scalar()?;
    stats.nodes_partial = body.read_scalar()?;
    stats.nodes_left = body.read_scalar()?;
    stats.tree_depth = body.read_scalar()?;
    stats.ramp_up_time = body.read_scalar()?;
    stats.idle_time = body.read_scalar()?;
    stats.ramp_down_time = body.read_scalar()?;
    Ok(stats)
}

fn forced_status_to_wire(status: ExitStatus) -> u8 {
    match status {
        ExitStatus::NodeLimit => 1,
        ExitStatus::TimeLimit => 2,
        ExitStatus::SolLimit => 3,
        ExitStatus::Unbounded => 4,
        _ => 0,
    }
}

/// Test support: assert every participant's index band is well formed
/// and disjoint from every other band.
#[cfg(test)]
pub(crate) fn band_check(n: usize, hubs: i64) {
    let topo = Topology::new(n, hubs);
    let mut bands: Vec<(i64, i64, usize)> = (0..topo.n)
        .map(|rank| {
            let (low, up) = topo.index_band(rank);
            (low, up, rank)
        })
        .collect();
    for (low, up, rank) in bands.iter() {
        assert!(0 <= *low && low <= up, "rank {} [{}, {}]", rank, low, up);
    }
    bands.sort_unstable();
    for pair in bands.windows(2) {
        assert!(
            pair[0].1 < pair[1].0,
            "bands overlap {:?} {:?}",
            pair[0],
            pair[1]
        );
    }
}

fn forced_status_from_wire(code: u8) -> ExitStatus {
    match code {
        1 => ExitStatus::NodeLimit,
        2 => ExitStatus::TimeLimit,
        3 => ExitStatus::SolLimit,
        4 => ExitStatus::Unbounded,
        _ => ExitStatus::Unknown,
    }
}

#[cfg(test)]
#[path = "parallel_test.rs"]
mod parallel_test;
