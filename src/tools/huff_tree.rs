//! Module to build the static Huffman tree and its codes.
//! This is used by the `tree_huff` module.
//!
//! The tree is built once from the symbol counts of the whole input, and is
//! carried in the compressed stream itself, so expansion never sees the counts.
//!
//! Ties between equal weights are broken by creation order: leaves are created in
//! ascending symbol order, merged nodes are created after all leaves in the order
//! they are made.  The oldest node is always removed first.  Any change to this rule
//! changes the compressed output bit for bit.

use bit_vec::BitVec;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use crate::tools::bit_io::{BitSource,BitSink};
use crate::{DYNERR,Error};

/// bits in one input word (byte)
pub const BITS_PER_WORD: usize = 8;
/// bits used to store a symbol in the tree header, one more than a byte
pub const SYMBOL_BITS: usize = BITS_PER_WORD + 1;
/// 256 byte values plus the end of stream symbol
pub const NUM_SYMBOLS: usize = (1 << BITS_PER_WORD) + 1;
/// end of stream symbol, one beyond the largest byte
pub const SENTINEL: u16 = 1 << BITS_PER_WORD;
/// Internal nodes can be no deeper than this in any tree over `NUM_SYMBOLS` leaves.
const MAX_DEPTH: usize = NUM_SYMBOLS - 2;

/// count of each symbol, indexed by symbol value
pub type FreqTable = [u64;NUM_SYMBOLS];

#[derive(Debug,Clone,PartialEq)]
pub enum Node {
    Leaf {
        symbol: u16,
        weight: u64
    },
    Internal {
        left: Box<Node>,
        right: Box<Node>,
        weight: u64
    }
}

impl Node {
    fn merge(left: Node,right: Node) -> Self {
        Self::Internal {
            weight: left.weight() + right.weight(),
            left: Box::new(left),
            right: Box::new(right)
        }
    }
    pub fn weight(&self) -> u64 {
        match self {
            Self::Leaf { weight, .. } => *weight,
            Self::Internal { weight, .. } => *weight
        }
    }
    /// symbols of all leaves, in left to right order
    pub fn symbols(&self) -> Vec<u16> {
        let mut ans = Vec::new();
        self.collect_symbols(&mut ans);
        ans
    }
    fn collect_symbols(&self,ans: &mut Vec<u16>) {
        match self {
            Self::Leaf { symbol, .. } => ans.push(*symbol),
            Self::Internal { left, right, .. } => {
                left.collect_symbols(ans);
                right.collect_symbols(ans);
            }
        }
    }
}

/// Node waiting in the priority queue.
/// `BinaryHeap` is a max-heap, so ordering is reversed to pop the lightest, then oldest.
struct Pending {
    weight: u64,
    order: usize,
    node: Node
}

impl Ord for Pending {
    fn cmp(&self,other: &Self) -> Ordering {
        other.weight.cmp(&self.weight).then_with(|| other.order.cmp(&self.order))
    }
}

impl PartialOrd for Pending {
    fn partial_cmp(&self,other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Pending {
    fn eq(&self,other: &Self) -> bool {
        self.weight == other.weight && self.order == other.order
    }
}

impl Eq for Pending {}

/// Count every byte until the source runs out.
/// The end of stream symbol is always given a count of 1.
/// The source is left at its end, caller must reset it before reading again.
pub fn count_symbols<S: BitSource>(src: &mut S) -> Result<FreqTable,std::io::Error> {
    let mut counts: FreqTable = [0;NUM_SYMBOLS];
    while let Some(word) = src.read_bits::<usize>(BITS_PER_WORD)? {
        counts[word] += 1;
    }
    counts[SENTINEL as usize] = 1;
    Ok(counts)
}

/// Build the tree by repeatedly merging the two lightest nodes.
/// The first node removed goes on the left.
pub fn build_tree(counts: &FreqTable) -> Result<Node,Error> {
    let mut queue = BinaryHeap::new();
    for (symbol,count) in counts.iter().enumerate() {
        if *count > 0 {
            queue.push(Pending {
                weight: *count,
                order: symbol,
                node: Node::Leaf { symbol: symbol as u16, weight: *count }
            });
        }
    }
    let mut order = NUM_SYMBOLS;
    while queue.len() > 1 {
        // both pops succeed since len > 1
        let (Some(left),Some(right)) = (queue.pop(),queue.pop()) else {
            break;
        };
        let node = Node::merge(left.node,right.node);
        queue.push(Pending { weight: node.weight(), order, node });
        order += 1;
    }
    match queue.pop() {
        Some(root) => Ok(root.node),
        None => Err(Error::NoSymbols)
    }
}

/// Code for every symbol in a tree, left is 0, right is 1
#[derive(Debug,Clone,PartialEq)]
pub struct CodeTable {
    codes: Vec<Option<BitVec>>
}

impl CodeTable {
    pub fn from_tree(root: &Node) -> Self {
        let mut codes = vec![None;NUM_SYMBOLS];
        match root {
            // lone leaf still needs one bit per symbol
            Node::Leaf { symbol, .. } => codes[*symbol as usize] = Some(BitVec::from_elem(1,false)),
            Node::Internal { .. } => Self::walk(root,&mut BitVec::new(),&mut codes)
        }
        Self { codes }
    }
    fn walk(node: &Node,path: &mut BitVec,codes: &mut [Option<BitVec>]) {
        match node {
            Node::Leaf { symbol, .. } => codes[*symbol as usize] = Some(path.clone()),
            Node::Internal { left, right, .. } => {
                path.push(false);
                Self::walk(left,path,codes);
                path.pop();
                path.push(true);
                Self::walk(right,path,codes);
                path.pop();
            }
        }
    }
    pub fn get(&self,symbol: u16) -> Option<&BitVec> {
        match self.codes.get(symbol as usize) {
            Some(Some(code)) => Some(code),
            _ => None
        }
    }
    /// (symbol,code) pairs in symbol order
    pub fn iter(&self) -> impl Iterator<Item = (u16,&BitVec)> {
        self.codes.iter().enumerate().filter_map(|(s,c)| c.as_ref().map(|code| (s as u16,code)))
    }
}

/// Write the tree in pre-order.  Internal nodes are a 0 bit,
/// leaves are a 1 bit followed by the symbol in `SYMBOL_BITS`.
pub fn write_tree<S: BitSink>(node: &Node,sink: &mut S) -> Result<(),std::io::Error> {
    match node {
        Node::Leaf { symbol, .. } => {
            sink.write_bits(1,1u8)?;
            sink.write_bits(SYMBOL_BITS,*symbol)
        },
        Node::Internal { left, right, .. } => {
            sink.write_bits(1,0u8)?;
            write_tree(left,sink)?;
            write_tree(right,sink)
        }
    }
}

/// Read a tree written by `write_tree`.  Weights are not stored, so they come back as 0.
pub fn read_tree<S: BitSource>(src: &mut S) -> Result<Node,DYNERR> {
    read_subtree(src,0)
}

fn read_subtree<S: BitSource>(src: &mut S,depth: usize) -> Result<Node,DYNERR> {
    match src.read_bits::<u8>(1)? {
        None => Err(Box::new(Error::TruncatedTree)),
        Some(0) => {
            if depth > MAX_DEPTH {
                log::error!("internal node at depth {}",depth);
                return Err(Box::new(Error::TreeTooDeep));
            }
            let left = read_subtree(src,depth + 1)?;
            let right = read_subtree(src,depth + 1)?;
            Ok(Node::Internal { left: Box::new(left), right: Box::new(right), weight: 0 })
        },
        Some(_) => {
            let symbol = src.read_bits::<u16>(SYMBOL_BITS)?.ok_or(Error::TruncatedTree)?;
            if symbol > SENTINEL {
                return Err(Box::new(Error::BadSymbol(symbol)));
            }
            log::trace!("leaf {} at depth {}",symbol,depth);
            Ok(Node::Leaf { symbol, weight: 0 })
        }
    }
}

#[cfg(test)]
fn counts_of(dat: &[u8]) -> FreqTable {
    let mut src = crate::tools::bit_io::BitReader::new(std::io::Cursor::new(dat),0).expect("create failed");
    count_symbols(&mut src).expect("count failed")
}

#[test]
fn sentinel_forced() {
    let counts = counts_of(&[]);
    assert_eq!(counts.iter().sum::<u64>(),1);
    assert_eq!(counts[SENTINEL as usize],1);
    let counts = counts_of("abracadabra".as_bytes());
    assert_eq!(counts[b'a' as usize],5);
    assert_eq!(counts[b'r' as usize],2);
    assert_eq!(counts[SENTINEL as usize],1);
    let tree = build_tree(&counts).expect("build failed");
    assert_eq!(tree.weight(),12);
    let eof_leaves = tree.symbols().iter().filter(|s| **s==SENTINEL).count();
    assert_eq!(eof_leaves,1);
}

#[test]
fn ties_go_to_oldest() {
    // a,b,EOF all have weight 1: a and b merge first, then EOF goes left of the new node
    let counts = counts_of("ab".as_bytes());
    let tree = build_tree(&counts).expect("build failed");
    assert_eq!(tree.symbols(),vec![SENTINEL,b'a' as u16,b'b' as u16]);
    let codes = CodeTable::from_tree(&tree);
    assert_eq!(codes.get(SENTINEL),Some(&BitVec::from_elem(1,false)));
    assert_eq!(codes.get(b'a' as u16).map(|c| c.len()),Some(2));
    assert_eq!(codes.get(b'c' as u16),None);
}

#[test]
fn deterministic() {
    let counts = counts_of("the quick brown fox jumps over the lazy dog".as_bytes());
    let t1 = build_tree(&counts).expect("build failed");
    let t2 = build_tree(&counts).expect("build failed");
    assert_eq!(t1,t2);
    assert_eq!(CodeTable::from_tree(&t1),CodeTable::from_tree(&t2));
}

#[test]
fn prefix_free() {
    let counts = counts_of("I am Sam. Sam I am. I do not like this Sam I am.\n".as_bytes());
    let tree = build_tree(&counts).expect("build failed");
    let codes = CodeTable::from_tree(&tree);
    let all: Vec<(u16,&BitVec)> = codes.iter().collect();
    assert_eq!(all.len(),tree.symbols().len());
    for (s1,c1) in &all {
        assert!(c1.len() > 0);
        for (s2,c2) in &all {
            if s1 != s2 && c1.len() <= c2.len() {
                let is_prefix = c1.iter().zip(c2.iter()).all(|(a,b)| a==b);
                assert!(!is_prefix,"code for {} is a prefix of code for {}",s1,s2);
            }
        }
    }
}

#[test]
fn two_leaves_for_one_byte() {
    let counts = counts_of(&[0x41;1000]);
    let tree = build_tree(&counts).expect("build failed");
    assert_eq!(tree.symbols(),vec![SENTINEL,0x41]);
    let codes = CodeTable::from_tree(&tree);
    assert_eq!(codes.get(0x41).map(|c| c.len()),Some(1));
    assert_eq!(codes.get(SENTINEL).map(|c| c.len()),Some(1));
}

#[test]
fn lone_leaf_gets_one_bit() {
    let tree = build_tree(&counts_of(&[])).expect("build failed");
    assert_eq!(tree,Node::Leaf { symbol: SENTINEL, weight: 1 });
    let codes = CodeTable::from_tree(&tree);
    assert_eq!(codes.get(SENTINEL),Some(&BitVec::from_elem(1,false)));
}

#[test]
fn empty_table_fails() {
    let counts: FreqTable = [0;NUM_SYMBOLS];
    assert!(matches!(build_tree(&counts),Err(Error::NoSymbols)));
}

#[test]
fn tree_invertibility() {
    let counts = counts_of("Mississippi river banks".as_bytes());
    let tree = build_tree(&counts).expect("build failed");
    let mut buf: Vec<u8> = Vec::new();
    let mut sink = crate::tools::bit_io::BitWriter::new(&mut buf);
    write_tree(&tree,&mut sink).expect("write failed");
    sink.close().expect("close failed");
    drop(sink);
    let mut src = crate::tools::bit_io::BitReader::new(std::io::Cursor::new(buf),0).expect("create failed");
    let restored = read_tree(&mut src).expect("read failed");
    assert_eq!(restored.weight(),0);
    assert_eq!(restored.symbols(),tree.symbols());
    assert_eq!(CodeTable::from_tree(&restored),CodeTable::from_tree(&tree));
}

#[test]
fn truncated_tree() {
    // internal, leaf 'A', then the stream ends where the right subtree should be
    let mut src = crate::tools::bit_io::BitReader::new(std::io::Cursor::new(vec![0x48,0x20]),0).expect("create failed");
    let err = read_tree(&mut src).expect_err("should fail");
    assert!(matches!(err.downcast_ref::<Error>(),Some(Error::TruncatedTree)));
}

#[test]
fn bad_symbol() {
    // leaf with value 511
    let mut src = crate::tools::bit_io::BitReader::new(std::io::Cursor::new(vec![0xFF,0xC0]),0).expect("create failed");
    let err = read_tree(&mut src).expect_err("should fail");
    assert!(matches!(err.downcast_ref::<Error>(),Some(Error::BadSymbol(511))));
}

#[test]
fn endless_nesting() {
    let mut src = crate::tools::bit_io::BitReader::new(std::io::Cursor::new(vec![0;64]),0).expect("create failed");
    let err = read_tree(&mut src).expect_err("should fail");
    assert!(matches!(err.downcast_ref::<Error>(),Some(Error::TreeTooDeep)));
}
