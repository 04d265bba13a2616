//! Static Huffman Compression with a Tree Header
//!
//! The input is read twice: once to count symbols, and again to emit codes.
//! The output is laid out as follows, packed MSB first:
//!
//! * 32 bit magic number `0xFACE8201`
//! * the code tree in pre-order, see `tools::huff_tree::write_tree`
//! * the code of every input byte
//! * the code of the end of stream symbol
//! * zero padding to the next byte
//!
//! There is no length field, expansion stops when it decodes the end of stream symbol.

use std::io::{Cursor,Read,Write,Seek,SeekFrom};
use crate::tools::bit_io::*;
use crate::tools::huff_tree::*;
use crate::{DYNERR,Error,Options};

/// bits in the magic number
pub const BITS_PER_INT: usize = 32;
const HUFF_NUMBER: u32 = 0xface8200;
/// magic number announcing a tree header
pub const MAGIC: u32 = HUFF_NUMBER | 1;

/// Emit the code of every word from the source, then the end of stream code.
fn write_compressed_bits<S: BitSource,K: BitSink>(codes: &CodeTable,src: &mut S,sink: &mut K) -> Result<(),DYNERR> {
    while let Some(word) = src.read_bits::<u16>(BITS_PER_WORD)? {
        match codes.get(word) {
            Some(code) => sink.write_code(code)?,
            None => {
                // only possible if the input changed since it was counted
                log::error!("input has a symbol that was not counted");
                return Err(Box::new(Error::MissingCode(word)));
            }
        }
    }
    let eof = codes.get(SENTINEL).ok_or(Error::MissingCode(SENTINEL))?;
    log::trace!("end of stream code has {} bits",eof.len());
    sink.write_code(eof)?;
    Ok(())
}

/// Walk the tree one bit at a time, emitting a byte at each leaf, until the end of stream leaf.
fn read_compressed_bits<S: BitSource,K: BitSink>(root: &Node,src: &mut S,sink: &mut K) -> Result<(),DYNERR> {
    let mut current = root;
    loop {
        let bit = match src.read_bits::<u8>(1)? {
            Some(b) => b,
            None => {
                log::error!("ran out of bits before end of stream symbol");
                return Err(Box::new(Error::TruncatedBody));
            }
        };
        current = match current {
            Node::Internal { left, right, .. } => match bit {
                0 => left.as_ref(),
                _ => right.as_ref()
            },
            // root is a lone leaf, its code is a single bit
            Node::Leaf { .. } => current
        };
        if let Node::Leaf { symbol, .. } = current {
            if *symbol == SENTINEL {
                return Ok(());
            }
            sink.write_bits(BITS_PER_WORD,*symbol)?;
            current = root;
        }
    }
}

/// Main compression function.
/// `expanded_in` is an object with `Read` and `Seek` traits, usually `std::fs::File`, or `std::io::Cursor<&[u8]>`.
/// `compressed_out` is an object with `Write` and `Seek` traits, usually `std::fs::File`, or `std::io::Cursor<Vec<u8>>`.
/// Returns (in_size,out_size) or error.
pub fn compress<R,W>(expanded_in: &mut R, compressed_out: &mut W, opt: &Options) -> Result<(u64,u64),DYNERR>
where R: Read + Seek, W: Write + Seek {
    let mut expanded_length = expanded_in.seek(SeekFrom::End(0))?;
    if opt.in_offset > expanded_length {
        return Err(Box::new(Error::FileFormatMismatch));
    }
    expanded_length -= opt.in_offset;
    if expanded_length > opt.max_file_size {
        return Err(Box::new(Error::FileTooLarge));
    }
    compressed_out.seek(SeekFrom::Start(opt.out_offset))?;
    let mut src = BitReader::new(expanded_in,opt.in_offset)?;
    let mut sink = BitWriter::new(compressed_out);

    log::debug!("counting symbols");
    let counts = count_symbols(&mut src)?;
    let tree = build_tree(&counts)?;
    let codes = CodeTable::from_tree(&tree);
    log::debug!("tree has {} leaves",codes.iter().count());
    for (symbol,code) in codes.iter() {
        log::trace!("{}: {} bits",symbol,code.len());
    }

    sink.write_bits(BITS_PER_INT,MAGIC)?;
    write_tree(&tree,&mut sink)?;
    log::debug!("rewind and encode");
    src.reset()?;
    write_compressed_bits(&codes,&mut src,&mut sink)?;
    sink.close()?;
    log::debug!("wrote {} bytes",sink.bytes_written());
    Ok((expanded_length,sink.bytes_written()))
}

/// Main decompression function.
/// `compressed_in` is an object with `Read` and `Seek` traits, usually `std::fs::File`, or `std::io::Cursor<&[u8]>`.
/// `expanded_out` is an object with `Write` and `Seek` traits, usually `std::fs::File`, or `std::io::Cursor<Vec<u8>>`.
/// Returns (in_size,out_size) or error.  Nothing is written if the header is bad.
pub fn expand<R,W>(compressed_in: &mut R, expanded_out: &mut W, opt: &Options) -> Result<(u64,u64),DYNERR>
where R: Read + Seek, W: Write + Seek {
    let mut compressed_size = compressed_in.seek(SeekFrom::End(0))?;
    if opt.in_offset > compressed_size {
        return Err(Box::new(Error::FileFormatMismatch));
    }
    compressed_size -= opt.in_offset;
    if compressed_size > opt.max_file_size {
        return Err(Box::new(Error::FileTooLarge));
    }
    let mut src = BitReader::new(compressed_in,opt.in_offset)?;

    let magic = match src.read_bits::<u32>(BITS_PER_INT)? {
        Some(val) => val,
        None => return Err(Box::new(Error::MissingHeader))
    };
    if magic != MAGIC {
        log::error!("expected {:#010x}, got {:#010x}",MAGIC,magic);
        return Err(Box::new(Error::BadHeader(magic)));
    }
    log::debug!("reading tree");
    let tree = read_tree(&mut src)?;
    log::debug!("tree has {} leaves",tree.symbols().len());

    expanded_out.seek(SeekFrom::Start(opt.out_offset))?;
    let mut sink = BitWriter::new(expanded_out);
    read_compressed_bits(&tree,&mut src,&mut sink)?;
    sink.close()?;
    log::debug!("end of stream after {} bytes",src.bytes_read());
    Ok((compressed_size,sink.bytes_written()))
}

/// Convenience function, calls `compress` with a slice returning a Vec
pub fn compress_slice(slice: &[u8],opt: &Options) -> Result<Vec<u8>,DYNERR> {
    let mut src = Cursor::new(slice);
    let mut ans: Cursor<Vec<u8>> = Cursor::new(Vec::new());
    compress(&mut src,&mut ans,opt)?;
    Ok(ans.into_inner())
}

/// Convenience function, calls `expand` with a slice returning a Vec
pub fn expand_slice(slice: &[u8],opt: &Options) -> Result<Vec<u8>,DYNERR> {
    let mut src = Cursor::new(slice);
    let mut ans: Cursor<Vec<u8>> = Cursor::new(Vec::new());
    expand(&mut src,&mut ans,opt)?;
    Ok(ans.into_inner())
}


// *************** TESTS *****************

#[cfg(test)]
use crate::STD_OPTIONS;

#[test]
fn compression_works() {
    // lone end of stream leaf with its one bit code
    let compressed = compress_slice(&[],&STD_OPTIONS).expect("compression failed");
    assert_eq!(compressed,hex::decode("FACE8201C000").unwrap());
    // A and EOF tie, A is older so it goes left
    let compressed = compress_slice("A".as_bytes(),&STD_OPTIONS).expect("compression failed");
    assert_eq!(compressed,hex::decode("FACE8201483802").unwrap());
}

#[test]
fn invertibility() {
    let test_data = "I am Sam. Sam I am. I do not like this Sam I am.\n".as_bytes();
    let compressed = compress_slice(test_data,&STD_OPTIONS).expect("compression failed");
    let expanded = expand_slice(&compressed,&STD_OPTIONS).expect("expansion failed");
    assert_eq!(test_data.to_vec(),expanded);
}

#[test]
fn invertibility_all_bytes() {
    let test_data: Vec<u8> = (0..4096).map(|i: u32| ((i * 7919) % 256) as u8).collect();
    let compressed = compress_slice(&test_data,&STD_OPTIONS).expect("compression failed");
    let expanded = expand_slice(&compressed,&STD_OPTIONS).expect("expansion failed");
    assert_eq!(test_data,expanded);
}

#[test]
fn invertibility_skewed() {
    // weights grow fast enough to make a deep tree
    let mut test_data = Vec::new();
    let mut n = 1;
    for by in 0..20u8 {
        test_data.append(&mut vec![by;n]);
        n = n * 3 / 2 + 1;
    }
    let compressed = compress_slice(&test_data,&STD_OPTIONS).expect("compression failed");
    let expanded = expand_slice(&compressed,&STD_OPTIONS).expect("expansion failed");
    assert_eq!(test_data,expanded);
}

#[test]
fn degenerate_inputs() {
    let expanded = expand_slice(&compress_slice(&[],&STD_OPTIONS).unwrap(),&STD_OPTIONS).expect("expansion failed");
    assert!(expanded.is_empty());

    let test_data = vec![0x41;1000];
    let compressed = compress_slice(&test_data,&STD_OPTIONS).expect("compression failed");
    // magic, 21 bits of tree, 1001 bits of codes
    assert_eq!(compressed.len(),4 + (21 + 1001 + 7) / 8);
    let mut src = BitReader::new(Cursor::new(&compressed),0).expect("create failed");
    src.read_bits::<u32>(BITS_PER_INT).unwrap();
    let tree = read_tree(&mut src).expect("bad tree");
    assert_eq!(tree.symbols(),vec![SENTINEL,0x41]);
    let expanded = expand_slice(&compressed,&STD_OPTIONS).expect("expansion failed");
    assert_eq!(test_data,expanded);
}

#[test]
fn bad_header() {
    let mut compressed = compress_slice("hello".as_bytes(),&STD_OPTIONS).expect("compression failed");
    compressed[3] = 0x00;
    let mut src = Cursor::new(&compressed);
    let mut ans: Cursor<Vec<u8>> = Cursor::new(Vec::new());
    let err = expand(&mut src,&mut ans,&STD_OPTIONS).expect_err("should fail");
    assert!(matches!(err.downcast_ref::<Error>(),Some(Error::BadHeader(0xface8200))));
    assert!(ans.into_inner().is_empty());

    let err = expand_slice(&[0xFA,0xCE],&STD_OPTIONS).expect_err("should fail");
    assert!(matches!(err.downcast_ref::<Error>(),Some(Error::MissingHeader)));
}

#[test]
fn truncation() {
    let test_data = "I am Sam. Sam I am. I do not like this Sam I am.\n".as_bytes();
    let compressed = compress_slice(test_data,&STD_OPTIONS).expect("compression failed");
    // last byte always holds the final bit of the end of stream code
    let err = expand_slice(&compressed[0..compressed.len()-1],&STD_OPTIONS).expect_err("should fail");
    assert!(matches!(err.downcast_ref::<Error>(),Some(Error::TruncatedBody)));
    // cut inside the tree
    let err = expand_slice(&compressed[0..6],&STD_OPTIONS).expect_err("should fail");
    assert!(matches!(err.downcast_ref::<Error>(),Some(Error::TruncatedTree)));
}

#[test]
fn offsets() {
    let mut opt = STD_OPTIONS;
    opt.in_offset = 4;
    opt.out_offset = 2;
    let test_data = "HDR:abracadabra".as_bytes();
    let compressed = compress_slice(test_data,&opt).expect("compression failed");
    assert_eq!(compressed[0..2],[0,0]);
    assert_eq!(compressed[2..],compress_slice("abracadabra".as_bytes(),&STD_OPTIONS).unwrap());
    opt.in_offset = 2;
    opt.out_offset = 0;
    let expanded = expand_slice(&compressed,&opt).expect("expansion failed");
    assert_eq!(expanded,"abracadabra".as_bytes());

    opt.in_offset = 100;
    let err = compress_slice(test_data,&opt).expect_err("should fail");
    assert!(matches!(err.downcast_ref::<Error>(),Some(Error::FileFormatMismatch)));
}

#[test]
fn size_limit() {
    let mut opt = STD_OPTIONS;
    opt.max_file_size = 8;
    let err = compress_slice(&[0;9],&opt).expect_err("should fail");
    assert!(matches!(err.downcast_ref::<Error>(),Some(Error::FileTooLarge)));
    assert!(compress_slice(&[0;8],&opt).is_ok());
}
