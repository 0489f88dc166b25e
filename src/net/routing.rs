//! 最短跳数路由
//!
//! 对每个目的地在反向图上做 BFS 得到跳数距离，再为每个 (from, dst) 选出一个下一跳：
//! 距离减一的邻居中地址最小的那个，保证同一拓扑下路由完全确定。

use std::collections::{BTreeMap, HashMap, VecDeque};

use super::id::NodeAddr;

#[derive(Debug, Clone)]
pub struct RoutingTable {
    dirty: bool,
    /// (from, dst) -> 下一跳
    next_hop: HashMap<(NodeAddr, NodeAddr), NodeAddr>,
    /// (from, dst) -> 跳数
    hops: HashMap<(NodeAddr, NodeAddr), u32>,
}

impl Default for RoutingTable {
    fn default() -> Self {
        Self {
            dirty: true,
            next_hop: HashMap::new(),
            hops: HashMap::new(),
        }
    }
}

impl RoutingTable {
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// 按当前拓扑重建。
    ///
    /// `adj[from]` 为从 `from` 出发的所有出边邻居（每个节点都必须有条目）。
    pub fn ensure_built(&mut self, adj: &BTreeMap<NodeAddr, Vec<NodeAddr>>) {
        if !self.dirty {
            return;
        }
        self.next_hop.clear();
        self.hops.clear();

        let mut rev: BTreeMap<NodeAddr, Vec<NodeAddr>> =
            adj.keys().map(|&n| (n, Vec::new())).collect();
        for (&from, outs) in adj {
            for &to in outs {
                rev.entry(to).or_default().push(from);
            }
        }

        let mut dist: HashMap<NodeAddr, u32> = HashMap::new();
        let mut q: VecDeque<NodeAddr> = VecDeque::new();
        for &dst in adj.keys() {
            dist.clear();
            q.clear();
            dist.insert(dst, 0);
            q.push_back(dst);
            while let Some(v) = q.pop_front() {
                let dv = dist[&v];
                for &pred in rev.get(&v).map(Vec::as_slice).unwrap_or(&[]) {
                    if !dist.contains_key(&pred) {
                        dist.insert(pred, dv + 1);
                        q.push_back(pred);
                    }
                }
            }

            for (&from, outs) in adj {
                if from == dst {
                    continue;
                }
                let Some(&df) = dist.get(&from) else {
                    continue; // 不可达
                };
                let best = outs
                    .iter()
                    .copied()
                    .filter(|nh| dist.get(nh) == Some(&(df - 1)))
                    .min();
                if let Some(nh) = best {
                    self.next_hop.insert((from, dst), nh);
                    self.hops.insert((from, dst), df);
                }
            }
        }

        self.dirty = false;
    }

    pub fn next_hop(&self, from: NodeAddr, dst: NodeAddr) -> Option<NodeAddr> {
        self.next_hop.get(&(from, dst)).copied()
    }

    pub fn hop_count(&self, from: NodeAddr, dst: NodeAddr) -> Option<u32> {
        if from == dst {
            return Some(0);
        }
        self.hops.get(&(from, dst)).copied()
    }

    /// 完整路径（含两端）；不可达时为 None
    pub fn path(&self, from: NodeAddr, dst: NodeAddr) -> Option<Vec<NodeAddr>> {
        let mut path = vec![from];
        let mut at = from;
        while at != dst {
            at = self.next_hop(at, dst)?;
            path.push(at);
        }
        Some(path)
    }
}
