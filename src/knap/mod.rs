//! Module `knap` implement a binary knapsack application on top of the
//! search engine.
//!
//! Items are sorted by value density; a node's bound is the linear
//! relaxation obtained by filling the remaining capacity greedily and
//! taking a fraction of the first item that does not fit. Branching
//! fixes that item out and in. Quality is the negated objective, so
//! better packings compare smaller. Mostly useful as a realistic test
//! application and as a template for real ones.

use cbordata::{Cbor, Cborize, FromCbor, IntoCbor};
use rand::{rngs::SmallRng, Rng, SeedableRng};

use std::{convert::TryFrom, sync::Arc};

use crate::{
    buf::Encoded,
    knowledge::{Decoded, Knowledge, Model, Prototype, SolutionData, TYPE_NODE, TYPE_SOLUTION},
    node::{BranchItem, NodeData, NodeStatus, ProcessArgs, ProcessOutcome},
    Error, Result, OBJ_MAX,
};

const VAR_FREE: u8 = 0;
const VAR_ONE: u8 = 1;
const VAR_ZERO: u8 = 2;

fn to_cbor_bytes<T: IntoCbor>(val: T) -> Result<Vec<u8>> {
    let mut data: Vec<u8> = vec![];
    err_at!(FailCbor, err_at!(FailCbor, val.into_cbor())?.encode(&mut data))?;
    Ok(data)
}

fn from_cbor_bytes<T: FromCbor>(mut data: &[u8]) -> Result<T> {
    let (val, _) = err_at!(FailCbor, Cbor::decode(&mut data))?;
    err_at!(FailCbor, T::from_cbor(val))
}

/// The immutable problem data, shared by the model, every node payload
/// and the decode prototype.
struct KnapInstance {
    capacity: i64,
    items: Vec<(i64, i64)>,
}

/// Knapsack instance: a capacity and `(size, profit)` items. Items are
/// re-ordered by value density in [Model::setup].
pub struct KnapModel {
    inst: Arc<KnapInstance>,
}

#[derive(Cborize)]
struct KnapModelWire {
    capacity: i64,
    sizes: Vec<i64>,
    profits: Vec<i64>,
}

impl KnapModelWire {
    const ID: u32 = 0x4b4d0001;
}

impl KnapModel {
    pub fn new(capacity: i64, items: Vec<(i64, i64)>) -> KnapModel {
        KnapModel {
            inst: Arc::new(KnapInstance { capacity, items }),
        }
    }

    /// Random correlated instance, capacity half the total size.
    pub fn gen_instance(num_items: usize, seed: u64) -> KnapModel {
        let mut rng = SmallRng::seed_from_u64(seed);
        let mut items = vec![];
        let mut total = 0;
        for _ in 0..num_items {
            let size = rng.gen_range(1..=100_i64);
            let profit = size + rng.gen_range(1..=10_i64);
            total += size;
            items.push((size, profit));
        }
        KnapModel::new(total / 2, items)
    }

    pub fn to_capacity(&self) -> i64 {
        self.inst.capacity
    }

    pub fn num_items(&self) -> usize {
        self.inst.items.len()
    }

    pub fn to_item(&self, off: usize) -> (i64, i64) {
        self.inst.items[off]
    }

    /// Prototype decoding this model's payloads and solutions.
    pub fn to_proto(&self) -> Box<KnapProto> {
        Box::new(KnapProto {
            inst: Arc::clone(&self.inst),
        })
    }

    fn inst_mut(&mut self) -> Result<&mut KnapInstance> {
        match Arc::get_mut(&mut self.inst) {
            Some(inst) => Ok(inst),
            None => err_at!(Fatal, msg: "instance mutated while shared"),
        }
    }
}

impl Knowledge for KnapModel {
    fn encode(&self, buf: &mut Encoded) -> Result<()> {
        let wire = KnapModelWire {
            capacity: self.inst.capacity,
            sizes: self.inst.items.iter().map(|i| i.0).collect(),
            profits: self.inst.items.iter().map(|i| i.1).collect(),
        };
        buf.write_bytes(&to_cbor_bytes(wire)?);
        Ok(())
    }
}

impl Model for KnapModel {
    /// Text format: first line `num_items capacity`, then one
    /// `size profit` pair per line.
    fn read_instance(&mut self, text: &str) -> Result<()> {
        let mut fields = text
            .split_whitespace()
            .map(|f| err_at!(FailConvert, f.parse::<i64>(), "field {:?}", f));
        let mut next = || match fields.next() {
            Some(val) => val,
            None => err_at!(InvalidInput, msg: "truncated instance"),
        };

        let n = err_at!(FailConvert, usize::try_from(next()?))?;
        let capacity = next()?;
        let mut items = Vec::with_capacity(n);
        for _ in 0..n {
            let size = next()?;
            let profit = next()?;
            items.push((size, profit));
        }

        let inst = self.inst_mut()?;
        inst.capacity = capacity;
        inst.items = items;
        Ok(())
    }

    /// Order items by value density, best first. Ties keep a stable
    /// order so instances explore deterministically.
    fn setup(&mut self) -> Result<()> {
        let inst = self.inst_mut()?;
        for (size, _) in inst.items.iter() {
            if *size <= 0 {
                return err_at!(InvalidInput, msg: "item size {}", size);
            }
        }
        inst.items.sort_by(|a, b| {
            let da = (a.1 as f64) / (a.0 as f64);
            let db = (b.1 as f64) / (b.0 as f64);
            db.total_cmp(&da)
        });
        Ok(())
    }

    fn create_root(&self) -> Result<Box<dyn NodeData>> {
        Ok(Box::new(KnapDesc {
            inst: Arc::clone(&self.inst),
            stati: vec![VAR_FREE; self.inst.items.len()],
            used_capacity: 0,
            used_value: 0,
            branched_on: None,
        }))
    }
}

/// Per-node payload: a decision per item plus the accumulated weight
/// and value of the fixed-in items.
pub struct KnapDesc {
    inst: Arc<KnapInstance>,
    stati: Vec<u8>,
    used_capacity: i64,
    used_value: i64,
    branched_on: Option<usize>,
}

#[derive(Cborize)]
struct KnapDescWire {
    stati: Vec<u8>,
    used_capacity: i64,
    used_value: i64,
    branched_on: i64,
}

impl KnapDescWire {
    const ID: u32 = 0x4b440001;
}

impl KnapDesc {
    /// Best known objective value, derived from the incumbent quality.
    fn best_value(args: &ProcessArgs) -> i64 {
        match args.incumbent {
            Some(quality) => (-quality) as i64,
            None => 0,
        }
    }

    fn build_solution(&self) -> KnapSolution {
        let inst = &self.inst;
        let mut picks: Vec<u8> = self
            .stati
            .iter()
            .map(|s| if *s == VAR_ONE { 1 } else { 0 })
            .collect();
        let mut value = self.used_value;

        let mut cap = inst.capacity - self.used_capacity;
        for (off, status) in self.stati.iter().enumerate() {
            if *status == VAR_FREE {
                picks[off] = 1;
                value += inst.items[off].1;
                cap -= inst.items[off].0;
                if cap == 0 {
                    break;
                }
            }
        }

        KnapSolution { picks, value }
    }

    fn child(&self, off: usize, decision: u8) -> KnapDesc {
        let mut stati = self.stati.clone();
        stati[off] = decision;
        let (size, profit) = self.inst.items[off];
        let (used_capacity, used_value) = match decision {
            VAR_ONE => (self.used_capacity + size, self.used_value + profit),
            _ => (self.used_capacity, self.used_value),
        };
        KnapDesc {
            inst: Arc::clone(&self.inst),
            stati,
            used_capacity,
            used_value,
            branched_on: None,
        }
    }
}

impl NodeData for KnapDesc {
    fn process(&mut self, args: &ProcessArgs) -> Result<ProcessOutcome> {
        let n = self.inst.items.len();

        // Greedy relaxation over the free items.
        let mut cap = self.inst.capacity - self.used_capacity;
        let mut val = self.used_value;
        let mut split = None;
        for off in 0..n {
            if self.stati[off] == VAR_FREE {
                cap -= self.inst.items[off].0;
                val += self.inst.items[off].1;
                if cap <= 0 {
                    split = Some(off);
                    break;
                }
            }
        }

        let best_value = Self::best_value(args);

        if cap < 0 && split.is_none() {
            // The fixed-in items alone overflow the capacity.
            return Ok(ProcessOutcome::new(NodeStatus::Fathomed, -(val as f64)));
        }

        if cap < 0 {
            // The split item only partially fits; bound with its
            // fractional contribution.
            let off = split.unwrap();
            let (size, profit) = self.inst.items[off];
            val -= profit;
            cap += size;
            let relax = (val as f64) + (profit as f64) * (cap as f64) / (size as f64);

            if relax <= best_value as f64 {
                Ok(ProcessOutcome::new(NodeStatus::Fathomed, -relax))
            } else {
                self.branched_on = Some(off);
                Ok(ProcessOutcome::new(NodeStatus::Pregnant, -relax))
            }
        } else {
            // Everything free fits; this node is a feasible packing.
            let mut outcome = ProcessOutcome::new(NodeStatus::Fathomed, -(val as f64));
            if best_value < val {
                outcome = outcome.set_solution(Box::new(self.build_solution()));
            }
            Ok(outcome)
        }
    }

    fn branch(&mut self) -> Result<Vec<BranchItem>> {
        let off = match self.branched_on {
            Some(off) => off,
            None => return err_at!(InvariantViolation, msg: "branching unprocessed node"),
        };

        // OBJ_MAX asks the engine to hand children the parent's
        // quality.
        let zero = self.child(off, VAR_ZERO);
        let one = self.child(off, VAR_ONE);
        let one_status = if one.used_capacity <= self.inst.capacity {
            NodeStatus::Candidate
        } else {
            NodeStatus::Fathomed
        };

        Ok(vec![
            BranchItem::new(Box::new(zero), NodeStatus::Candidate, OBJ_MAX),
            BranchItem::new(Box::new(one), one_status, OBJ_MAX),
        ])
    }

    fn encode(&self, buf: &mut Encoded) -> Result<()> {
        let wire = KnapDescWire {
            stati: self.stati.clone(),
            used_capacity: self.used_capacity,
            used_value: self.used_value,
            branched_on: self.branched_on.map(|off| off as i64).unwrap_or(-1),
        };
        buf.write_bytes(&to_cbor_bytes(wire)?);
        Ok(())
    }
}

/// A feasible packing.
pub struct KnapSolution {
    picks: Vec<u8>,
    value: i64,
}

#[derive(Cborize)]
struct KnapSolutionWire {
    picks: Vec<u8>,
    value: i64,
}

impl KnapSolutionWire {
    const ID: u32 = 0x4b530001;
}

impl KnapSolution {
    pub fn to_value(&self) -> i64 {
        self.value
    }

    pub fn as_picks(&self) -> &[u8] {
        &self.picks
    }
}

impl Knowledge for KnapSolution {
    fn encode(&self, buf: &mut Encoded) -> Result<()> {
        let wire = KnapSolutionWire {
            picks: self.picks.clone(),
            value: self.value,
        };
        buf.write_bytes(&to_cbor_bytes(wire)?);
        Ok(())
    }
}

impl SolutionData for KnapSolution {
    fn quality(&self) -> f64 {
        -(self.value as f64)
    }

    fn render(&self) -> String {
        let picked: Vec<String> = self
            .picks
            .iter()
            .enumerate()
            .filter(|(_, p)| **p == 1)
            .map(|(off, _)| off.to_string())
            .collect();
        format!("value {} items [{}]", self.value, picked.join(" "))
    }
}

/// Decode prototype for knapsack payloads and solutions; holds the
/// shared instance so decoded payloads stay wired to the problem data.
pub struct KnapProto {
    inst: Arc<KnapInstance>,
}

impl Prototype for KnapProto {
    fn decode(&self, buf: &mut Encoded) -> Result<Decoded> {
        match buf.as_type() {
            TYPE_NODE => {
                let wire: KnapDescWire = from_cbor_bytes(&buf.read_bytes()?)?;
                let desc = KnapDesc {
                    inst: Arc::clone(&self.inst),
                    stati: wire.stati,
                    used_capacity: wire.used_capacity,
                    used_value: wire.used_value,
                    branched_on: match wire.branched_on {
                        off if off >= 0 => Some(off as usize),
                        _ => None,
                    },
                };
                Ok(Decoded::Node(Box::new(desc)))
            }
            TYPE_SOLUTION => {
                let wire: KnapSolutionWire = from_cbor_bytes(&buf.read_bytes()?)?;
                Ok(Decoded::Solution(Box::new(KnapSolution {
                    picks: wire.picks,
                    value: wire.value,
                })))
            }
            tag => err_at!(UnknownType, msg: "knap cannot decode {:?}", tag),
        }
    }
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod mod_test;
