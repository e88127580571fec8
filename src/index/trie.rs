//! Mini burst trie over reference half-mers.
//!
//! The trie is the reference-side index the traverser walks: a 4-ary tree
//! whose edges are nucleotides and whose leaves are *buckets* listing the
//! packed L-mer keys that spell the root-to-leaf path. Interior nodes live in
//! a contiguous arena and reference their children by arena offset; child
//! offsets strictly increase, so the structure is a tree by construction and
//! a single forward pass can validate it.
//!
//! Buckets terminate exactly at depth `P` (the half-window). The burst policy
//! of the upstream index builder is not interpreted here: the traverser walks
//! whatever the loader admitted, and the loader rejects any bucket that does
//! not sit at full depth.

use crate::error::{FilterError, Result};

const TAG_SHIFT: u32 = 30;
const TAG_EMPTY: u32 = 0;
const TAG_NODE: u32 = 1;
const TAG_BUCKET: u32 = 2;
const PAYLOAD_MASK: u32 = (1 << TAG_SHIFT) - 1;

/// One child slot of a trie node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Child {
    Empty,
    /// Arena offset of an interior node.
    Node(u32),
    /// Arena offset of a bucket.
    Bucket(u32),
}

fn encode_child(child: Child) -> u32 {
    match child {
        Child::Empty => 0,
        Child::Node(i) => (TAG_NODE << TAG_SHIFT) | i,
        Child::Bucket(i) => (TAG_BUCKET << TAG_SHIFT) | i,
    }
}

fn decode_child(word: u32) -> Result<Child> {
    let payload = word & PAYLOAD_MASK;
    match word >> TAG_SHIFT {
        TAG_EMPTY if word == 0 => Ok(Child::Empty),
        TAG_NODE => Ok(Child::Node(payload)),
        TAG_BUCKET => Ok(Child::Bucket(payload)),
        _ => Err(FilterError::corrupt(format!(
            "trie child word has invalid tag: {:#010x}",
            word
        ))),
    }
}

/// Arena-backed mini burst trie for one half (forward or reverse) of the
/// seed window.
#[derive(Debug)]
pub struct MiniBurstTrie {
    nodes: Vec<[u32; 4]>,
    bucket_bounds: Vec<(u32, u32)>,
    keys: Vec<u32>,
    root: u32,
    partial_win: u32,
}

impl MiniBurstTrie {
    /// A trie with no entries; the traverser short-circuits on it.
    pub fn empty(partial_win: u32) -> Self {
        MiniBurstTrie {
            nodes: Vec::new(),
            bucket_bounds: Vec::new(),
            keys: Vec::new(),
            root: 0,
            partial_win,
        }
    }

    pub fn partial_win(&self) -> u32 {
        self.partial_win
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn root(&self) -> u32 {
        self.root
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn num_keys(&self) -> usize {
        self.keys.len()
    }

    /// Child of `node` along nucleotide `c`.
    #[inline]
    pub fn child(&self, node: u32, c: u8) -> Child {
        debug_assert!(c < 4);
        let word = self.nodes[node as usize][c as usize];
        // Words were validated at load time; decoding cannot fail here.
        decode_child(word).unwrap_or(Child::Empty)
    }

    /// Keys stored in a bucket, in storage order.
    #[inline]
    pub fn bucket_keys(&self, bucket: u32) -> &[u32] {
        let (start, len) = self.bucket_bounds[bucket as usize];
        &self.keys[start as usize..(start + len) as usize]
    }

    /// Largest key referenced by any bucket, if any. Used by the index
    /// loader to cross-check the occurrence table.
    pub fn max_key(&self) -> Option<u32> {
        self.keys.iter().copied().max()
    }

    /// Serialize: length-prefixed node arena, length-prefixed bucket arena,
    /// root offset. All integers little-endian.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&(self.nodes.len() as u32).to_le_bytes());
        for node in &self.nodes {
            for &word in node {
                buf.extend_from_slice(&word.to_le_bytes());
            }
        }
        buf.extend_from_slice(&(self.bucket_bounds.len() as u32).to_le_bytes());
        for &(start, len) in &self.bucket_bounds {
            buf.extend_from_slice(&len.to_le_bytes());
            for &key in &self.keys[start as usize..(start + len) as usize] {
                buf.extend_from_slice(&key.to_le_bytes());
            }
        }
        buf.extend_from_slice(&self.root.to_le_bytes());
        buf
    }

    /// Parse and validate an arena pair from `cursor`, consuming exactly the
    /// bytes the serialization produced.
    pub fn from_cursor(cursor: &mut crate::index::ByteCursor<'_>, partial_win: u32) -> Result<Self> {
        let node_count = cursor.read_u32()? as usize;
        let mut nodes = Vec::with_capacity(node_count);
        for _ in 0..node_count {
            let mut node = [0u32; 4];
            for slot in node.iter_mut() {
                *slot = cursor.read_u32()?;
            }
            nodes.push(node);
        }
        let bucket_count = cursor.read_u32()? as usize;
        let mut bucket_bounds = Vec::with_capacity(bucket_count);
        let mut keys = Vec::new();
        for _ in 0..bucket_count {
            let len = cursor.read_u32()?;
            let start = keys.len() as u32;
            for _ in 0..len {
                keys.push(cursor.read_u32()?);
            }
            bucket_bounds.push((start, len));
        }
        let root = cursor.read_u32()?;

        let trie = MiniBurstTrie {
            nodes,
            bucket_bounds,
            keys,
            root,
            partial_win,
        };
        trie.validate()?;
        Ok(trie)
    }

    /// Structural validation: tags decode, child offsets advance strictly,
    /// every node is referenced at most once, and buckets sit at depth P.
    fn validate(&self) -> Result<()> {
        if self.nodes.is_empty() {
            return Ok(());
        }
        if self.root as usize >= self.nodes.len() {
            return Err(FilterError::corrupt(format!(
                "trie root {} out of range ({} nodes)",
                self.root,
                self.nodes.len()
            )));
        }
        if self.partial_win == 0 {
            return Err(FilterError::corrupt("trie half-window is zero"));
        }
        let mut seen = vec![false; self.nodes.len()];
        let mut seen_buckets = vec![false; self.bucket_bounds.len()];
        seen[self.root as usize] = true;
        let mut stack = vec![(self.root, 0u32)];
        while let Some((node, depth)) = stack.pop() {
            for c in 0..4u8 {
                let word = self.nodes[node as usize][c as usize];
                match decode_child(word)? {
                    Child::Empty => {}
                    Child::Node(i) => {
                        if depth + 1 >= self.partial_win {
                            return Err(FilterError::corrupt(format!(
                                "trie node {} exceeds half-window depth {}",
                                i, self.partial_win
                            )));
                        }
                        if i <= node || i as usize >= self.nodes.len() {
                            return Err(FilterError::corrupt(format!(
                                "trie child offset {} does not advance from node {}",
                                i, node
                            )));
                        }
                        if seen[i as usize] {
                            return Err(FilterError::corrupt(format!(
                                "trie node {} referenced twice",
                                i
                            )));
                        }
                        seen[i as usize] = true;
                        stack.push((i, depth + 1));
                    }
                    Child::Bucket(b) => {
                        if b as usize >= self.bucket_bounds.len() {
                            return Err(FilterError::corrupt(format!(
                                "trie bucket offset {} out of range ({} buckets)",
                                b,
                                self.bucket_bounds.len()
                            )));
                        }
                        if depth + 1 != self.partial_win {
                            return Err(FilterError::corrupt(format!(
                                "trie bucket {} at depth {}, expected {}",
                                b,
                                depth + 1,
                                self.partial_win
                            )));
                        }
                        if seen_buckets[b as usize] {
                            return Err(FilterError::corrupt(format!(
                                "trie bucket {} referenced twice",
                                b
                            )));
                        }
                        seen_buckets[b as usize] = true;
                    }
                }
            }
        }
        Ok(())
    }
}

enum BuildChild {
    Empty,
    Node(usize),
    Bucket(usize),
}

struct BuildNode {
    children: [BuildChild; 4],
}

impl BuildNode {
    fn new() -> Self {
        BuildNode {
            children: [
                BuildChild::Empty,
                BuildChild::Empty,
                BuildChild::Empty,
                BuildChild::Empty,
            ],
        }
    }
}

/// In-memory construction of a [`MiniBurstTrie`]. Used by the index loader
/// round-trip tests and by the toy indexes in the test suite; building the
/// trie *from reference FASTA* is the upstream indexer's job.
pub struct TrieBuilder {
    partial_win: u32,
    nodes: Vec<BuildNode>,
    buckets: Vec<Vec<u32>>,
}

impl TrieBuilder {
    pub fn new(partial_win: u32) -> Self {
        TrieBuilder {
            partial_win,
            nodes: Vec::new(),
            buckets: Vec::new(),
        }
    }

    /// Insert one half-mer (numeric, length P, no `N`) mapping to `key`.
    pub fn insert(&mut self, halfmer: &[u8], key: u32) -> Result<()> {
        if halfmer.len() != self.partial_win as usize {
            return Err(FilterError::InvalidOption(format!(
                "half-mer length {} does not match half-window {}",
                halfmer.len(),
                self.partial_win
            )));
        }
        if let Some(&bad) = halfmer.iter().find(|&&c| c >= 4) {
            return Err(FilterError::InvalidOption(format!(
                "half-mer contains non-ACGT code {}",
                bad
            )));
        }
        if self.nodes.is_empty() {
            self.nodes.push(BuildNode::new());
        }
        let mut node = 0usize;
        for (depth, &c) in halfmer.iter().enumerate() {
            let last = depth + 1 == self.partial_win as usize;
            if last {
                let bucket = match self.nodes[node].children[c as usize] {
                    BuildChild::Bucket(b) => b,
                    BuildChild::Empty => {
                        self.buckets.push(Vec::new());
                        let b = self.buckets.len() - 1;
                        self.nodes[node].children[c as usize] = BuildChild::Bucket(b);
                        b
                    }
                    BuildChild::Node(_) => unreachable!("node at bucket depth"),
                };
                self.buckets[bucket].push(key);
            } else {
                node = match self.nodes[node].children[c as usize] {
                    BuildChild::Node(n) => n,
                    BuildChild::Empty => {
                        self.nodes.push(BuildNode::new());
                        let n = self.nodes.len() - 1;
                        self.nodes[node].children[c as usize] = BuildChild::Node(n);
                        n
                    }
                    BuildChild::Bucket(_) => unreachable!("bucket above full depth"),
                };
            }
        }
        Ok(())
    }

    /// Finish: renumber nodes in preorder so child offsets strictly advance.
    pub fn build(self) -> MiniBurstTrie {
        if self.nodes.is_empty() {
            return MiniBurstTrie::empty(self.partial_win);
        }
        // Preorder numbering over the build arena.
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut renum = vec![u32::MAX; self.nodes.len()];
        let mut stack = vec![0usize];
        while let Some(n) = stack.pop() {
            renum[n] = order.len() as u32;
            order.push(n);
            for c in (0..4).rev() {
                if let BuildChild::Node(child) = self.nodes[n].children[c] {
                    stack.push(child);
                }
            }
        }

        let mut bucket_bounds = Vec::with_capacity(self.buckets.len());
        let mut keys = Vec::new();
        for bucket in &self.buckets {
            let start = keys.len() as u32;
            keys.extend_from_slice(bucket);
            bucket_bounds.push((start, bucket.len() as u32));
        }

        let mut nodes = Vec::with_capacity(order.len());
        for &old in &order {
            let mut words = [0u32; 4];
            for c in 0..4 {
                words[c] = encode_child(match self.nodes[old].children[c] {
                    BuildChild::Empty => Child::Empty,
                    BuildChild::Node(n) => Child::Node(renum[n]),
                    BuildChild::Bucket(b) => Child::Bucket(b as u32),
                });
            }
            nodes.push(words);
        }

        MiniBurstTrie {
            nodes,
            bucket_bounds,
            keys,
            root: 0,
            partial_win: self.partial_win,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::ByteCursor;

    fn toy() -> MiniBurstTrie {
        let mut b = TrieBuilder::new(2);
        b.insert(&[0, 1], 7).unwrap(); // AC
        b.insert(&[0, 2], 9).unwrap(); // AG
        b.insert(&[3, 3], 11).unwrap(); // TT
        b.build()
    }

    #[test]
    fn builder_produces_walkable_trie() {
        let t = toy();
        assert!(!t.is_empty());
        let root = t.root();
        let a = match t.child(root, 0) {
            Child::Node(n) => n,
            other => panic!("expected node under A, got {:?}", other),
        };
        match t.child(a, 1) {
            Child::Bucket(b) => assert_eq!(t.bucket_keys(b), &[7]),
            other => panic!("expected bucket under AC, got {:?}", other),
        }
        match t.child(a, 2) {
            Child::Bucket(b) => assert_eq!(t.bucket_keys(b), &[9]),
            other => panic!("expected bucket under AG, got {:?}", other),
        }
        assert_eq!(t.child(root, 1), Child::Empty);
        assert_eq!(t.max_key(), Some(11));
    }

    #[test]
    fn shared_halfmers_share_a_bucket() {
        let mut b = TrieBuilder::new(3);
        b.insert(&[0, 1, 2], 1).unwrap();
        b.insert(&[0, 1, 2], 2).unwrap();
        let t = b.build();
        assert_eq!(t.num_keys(), 2);
        let n0 = match t.child(t.root(), 0) {
            Child::Node(n) => n,
            _ => panic!(),
        };
        let n1 = match t.child(n0, 1) {
            Child::Node(n) => n,
            _ => panic!(),
        };
        match t.child(n1, 2) {
            Child::Bucket(b) => assert_eq!(t.bucket_keys(b), &[1, 2]),
            _ => panic!(),
        }
    }

    #[test]
    fn bytes_round_trip() {
        let t = toy();
        let bytes = t.to_bytes();
        let mut cursor = ByteCursor::new(&bytes);
        let back = MiniBurstTrie::from_cursor(&mut cursor, 2).unwrap();
        assert!(cursor.is_at_end());
        assert_eq!(back.to_bytes(), bytes);
    }

    #[test]
    fn load_rejects_wrong_depth() {
        // A depth-2 trie loaded as if it were depth 3: buckets now sit too
        // shallow and must be refused.
        let bytes = toy().to_bytes();
        let mut cursor = ByteCursor::new(&bytes);
        let err = MiniBurstTrie::from_cursor(&mut cursor, 3).unwrap_err();
        assert!(err.to_string().contains("depth"));
    }

    #[test]
    fn load_rejects_backward_child_offsets() {
        let t = toy();
        let mut bytes = t.to_bytes();
        // Point the root's A child at the root itself (offset 0 with the
        // node tag), creating a cycle.
        let word = (1u32 << 30).to_le_bytes();
        bytes[4..8].copy_from_slice(&word);
        let mut cursor = ByteCursor::new(&bytes);
        assert!(MiniBurstTrie::from_cursor(&mut cursor, 2).is_err());
    }

    #[test]
    fn empty_trie_serializes() {
        let t = TrieBuilder::new(4).build();
        let bytes = t.to_bytes();
        let mut cursor = ByteCursor::new(&bytes);
        let back = MiniBurstTrie::from_cursor(&mut cursor, 4).unwrap();
        assert!(back.is_empty());
    }
}
