//! Bit level reading and writing.
//!
//! Bits are always packed most significant first.  Values can be any primitive
//! integer wide enough for the requested bit count, so callers can move a 9-bit
//! symbol through a `u16` and the 32-bit magic number through a `u32` without casting.

use bit_vec::BitVec;
use num_traits::PrimInt;
use std::io::{Read,Write,Seek,SeekFrom,BufReader,BufWriter,ErrorKind};

/// bytes to pull from the reader each time the bit buffer runs dry
const READ_CHUNK: usize = 64;
/// pending bits that trigger draining whole bytes to the writer
const DRAIN_BITS: usize = 512;

/// Something bits can be read from, and that can be rewound to its start.
pub trait BitSource {
    /// Read `num_bits` bits MSB first.
    /// Returns `None` if fewer than `num_bits` remain.
    fn read_bits<T: PrimInt>(&mut self,num_bits: usize) -> Result<Option<T>,std::io::Error>;
    /// go back to the start of the stream
    fn reset(&mut self) -> Result<(),std::io::Error>;
}

/// Something bits can be written to.
pub trait BitSink {
    /// Append the low `num_bits` of `value`, MSB first.
    fn write_bits<T: PrimInt>(&mut self,num_bits: usize,value: T) -> Result<(),std::io::Error>;
    /// Write out any pending partial byte, padding with zeros, and flush.
    fn close(&mut self) -> Result<(),std::io::Error>;
    /// Append a code in order from first to last bit.
    fn write_code(&mut self,code: &BitVec) -> Result<(),std::io::Error> {
        for bit in code.iter() {
            self.write_bits(1,bit as u8)?;
        }
        Ok(())
    }
}

pub struct BitReader<R: Read + Seek> {
    reader: BufReader<R>,
    /// position that `reset` returns to
    start: u64,
    bits: BitVec,
    ptr: usize,
    /// bytes consumed from the reader since the last reset
    count: u64
}

impl <R: Read + Seek> BitReader<R> {
    /// Create a reader positioned at byte `start` of `reader`
    pub fn new(reader: R,start: u64) -> Result<Self,std::io::Error> {
        let mut reader = BufReader::new(reader);
        reader.seek(SeekFrom::Start(start))?;
        Ok(Self {
            reader,
            start,
            bits: BitVec::new(),
            ptr: 0,
            count: 0
        })
    }
    pub fn bytes_read(&self) -> u64 {
        self.count
    }
    /// Get the next bit, reading from the stream as needed.
    /// `None` means the stream is exhausted.
    fn get_bit(&mut self) -> Result<Option<bool>,std::io::Error> {
        if let Some(bit) = self.bits.get(self.ptr) {
            self.ptr += 1;
            return Ok(Some(bit));
        }
        let mut buf: [u8;READ_CHUNK] = [0;READ_CHUNK];
        let n = loop {
            match self.reader.read(&mut buf) {
                Ok(n) => break n,
                Err(e) if e.kind()==ErrorKind::Interrupted => continue,
                Err(e) => return Err(e)
            }
        };
        if n == 0 {
            return Ok(None);
        }
        self.count += n as u64;
        self.bits = BitVec::from_bytes(&buf[0..n]);
        self.ptr = 1;
        Ok(self.bits.get(0))
    }
}

impl <R: Read + Seek> BitSource for BitReader<R> {
    fn read_bits<T: PrimInt>(&mut self,num_bits: usize) -> Result<Option<T>,std::io::Error> {
        let mut ans = T::zero();
        for _i in 0..num_bits {
            ans = ans << 1;
            match self.get_bit()? {
                Some(true) => ans = ans | T::one(),
                Some(false) => {},
                None => return Ok(None)
            }
        }
        Ok(Some(ans))
    }
    fn reset(&mut self) -> Result<(),std::io::Error> {
        log::trace!("rewind to {}",self.start);
        self.reader.seek(SeekFrom::Start(self.start))?;
        self.bits = BitVec::new();
        self.ptr = 0;
        self.count = 0;
        Ok(())
    }
}

pub struct BitWriter<W: Write> {
    writer: BufWriter<W>,
    /// bits not yet written, always starts on a byte boundary
    bits: BitVec,
    /// bytes handed to the writer
    count: u64,
    closed: bool
}

impl <W: Write> BitWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: BufWriter::new(writer),
            bits: BitVec::new(),
            count: 0,
            closed: false
        }
    }
    pub fn bytes_written(&self) -> u64 {
        self.count
    }
    /// write every complete byte, keep the remainder
    fn drain_bytes(&mut self) -> Result<(),std::io::Error> {
        let whole = self.bits.len() / 8;
        if whole > 0 {
            let bytes = self.bits.to_bytes();
            self.writer.write_all(&bytes[0..whole])?;
            self.count += whole as u64;
            self.bits = self.bits.iter().skip(whole*8).collect();
        }
        Ok(())
    }
}

impl <W: Write> BitSink for BitWriter<W> {
    fn write_bits<T: PrimInt>(&mut self,num_bits: usize,value: T) -> Result<(),std::io::Error> {
        for i in (0..num_bits).rev() {
            self.bits.push((value >> i) & T::one() == T::one());
        }
        if self.bits.len() >= DRAIN_BITS {
            self.drain_bytes()?;
        }
        Ok(())
    }
    fn close(&mut self) -> Result<(),std::io::Error> {
        self.drain_bytes()?;
        if !self.bits.is_empty() {
            // to_bytes pads the last byte with zeros
            self.writer.write_all(&self.bits.to_bytes())?;
            self.count += 1;
            self.bits = BitVec::new();
        }
        self.writer.flush()?;
        self.closed = true;
        Ok(())
    }
}

impl <W: Write> Drop for BitWriter<W> {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(e) = self.close() {
                log::warn!("could not flush bits on drop: {}",e);
            }
        }
    }
}

#[test]
fn msb_first_packing() {
    let mut ans: Vec<u8> = Vec::new();
    let mut writer = BitWriter::new(&mut ans);
    writer.write_bits(1,1u8).expect("write failed");
    writer.write_bits(9,0x100u16).expect("write failed");
    writer.write_bits(3,0b101u8).expect("write failed");
    writer.close().expect("close failed");
    assert_eq!(writer.bytes_written(),2);
    drop(writer);
    // 1 100000000 101 + 3 bits padding
    assert_eq!(ans,hex::decode("C028").unwrap());
}

#[test]
fn write_code_in_order() {
    let mut ans: Vec<u8> = Vec::new();
    let mut writer = BitWriter::new(&mut ans);
    let mut code = BitVec::new();
    for bit in [true,true,false,true] {
        code.push(bit);
    }
    writer.write_code(&code).expect("write failed");
    writer.write_code(&code).expect("write failed");
    drop(writer);
    assert_eq!(ans,vec![0xDD]);
}

#[test]
fn end_of_stream() {
    let dat = hex::decode("FACE8201A5").unwrap();
    let mut reader = BitReader::new(std::io::Cursor::new(dat),0).expect("create failed");
    assert_eq!(reader.read_bits::<u32>(32).unwrap(),Some(0xFACE8201));
    assert_eq!(reader.read_bits::<u8>(4).unwrap(),Some(0xA));
    // only 4 bits remain
    assert_eq!(reader.read_bits::<u8>(8).unwrap(),None);
    assert_eq!(reader.read_bits::<u8>(1).unwrap(),None);
}

#[test]
fn reset_to_offset() {
    let dat = vec![0x11,0x22,0x33];
    let mut reader = BitReader::new(std::io::Cursor::new(dat),1).expect("create failed");
    assert_eq!(reader.read_bits::<usize>(8).unwrap(),Some(0x22));
    assert_eq!(reader.read_bits::<usize>(8).unwrap(),Some(0x33));
    assert_eq!(reader.read_bits::<usize>(8).unwrap(),None);
    assert_eq!(reader.bytes_read(),2);
    reader.reset().expect("reset failed");
    assert_eq!(reader.read_bits::<u16>(12).unwrap(),Some(0x223));
}

#[test]
fn long_stream() {
    let dat: Vec<u8> = (0..1000).map(|i| (i % 251) as u8).collect();
    let mut ans: Vec<u8> = Vec::new();
    let mut writer = BitWriter::new(&mut ans);
    for by in &dat {
        writer.write_bits(3,by >> 5).expect("write failed");
        writer.write_bits(5,by & 0x1f).expect("write failed");
    }
    writer.close().expect("close failed");
    drop(writer);
    assert_eq!(ans,dat);
}
