//! Self-relative NT security descriptor decoding (the `system.cifs_ntsd` xattr format).
//!
//! Only what the ACL translation needs is decoded: owner, group and the DACL. SACLs are
//! skipped.

use byteorder::{BigEndian, LittleEndian, ReadBytesExt, WriteBytesExt};
use std::fmt;
use std::io::{self, Cursor, Seek, SeekFrom};

const SE_DACL_PRESENT: u16 = 0x0004;
const SE_SELF_RELATIVE: u16 = 0x8000;
const HEADER_LEN: usize = 20;
const ACL_HEADER_LEN: usize = 8;

pub const ACCESS_ALLOWED_ACE_TYPE: u8 = 0;
pub const ACCESS_DENIED_ACE_TYPE: u8 = 1;
pub const INHERIT_ONLY_ACE: u8 = 0x08;

pub const WORLD_SID: &str = "S-1-1-0";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sid {
    pub revision: u8,
    pub authority: u64,
    pub sub_authorities: Vec<u32>,
}

impl Sid {
    fn read(cur: &mut Cursor<&[u8]>) -> io::Result<Sid> {
        let revision = cur.read_u8()?;
        let count = cur.read_u8()?;
        let authority = cur.read_u48::<BigEndian>()?;
        let mut sub_authorities = Vec::with_capacity(count as usize);
        for _ in 0..count {
            sub_authorities.push(cur.read_u32::<LittleEndian>()?);
        }
        Ok(Sid {
            revision,
            authority,
            sub_authorities,
        })
    }

    fn write(&self, out: &mut Vec<u8>) -> io::Result<()> {
        out.write_u8(self.revision)?;
        out.write_u8(self.sub_authorities.len() as u8)?;
        out.write_u48::<BigEndian>(self.authority)?;
        for s in &self.sub_authorities {
            out.write_u32::<LittleEndian>(*s)?;
        }
        Ok(())
    }

    fn encoded_len(&self) -> usize {
        8 + 4 * self.sub_authorities.len()
    }

    pub fn is_world(&self) -> bool {
        self.authority == 1 && self.sub_authorities == [0]
    }
}

impl fmt::Display for Sid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S-{}-", self.revision)?;
        if self.authority >> 32 == 0 {
            write!(f, "{}", self.authority)?;
        } else {
            write!(f, "0x{:012X}", self.authority)?;
        }
        for s in &self.sub_authorities {
            write!(f, "-{s}")?;
        }
        Ok(())
    }
}

impl std::str::FromStr for Sid {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split('-');
        if !parts.next().is_some_and(|p| p.eq_ignore_ascii_case("S")) {
            return Err(format!("invalid SID: {s}"));
        }
        let num = |p: Option<&str>| -> Result<u64, String> {
            p.and_then(|p| p.parse().ok())
                .ok_or_else(|| format!("invalid SID: {s}"))
        };
        let revision = num(parts.next())? as u8;
        let authority = num(parts.next())?;
        let sub_authorities = parts
            .map(|p| p.parse::<u32>().map_err(|_| format!("invalid SID: {s}")))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Sid {
            revision,
            authority,
            sub_authorities,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ace {
    pub ace_type: u8,
    pub flags: u8,
    pub mask: u32,
    pub sid: Sid,
}

impl Ace {
    pub fn allowed(sid: Sid, mask: u32) -> Self {
        Ace {
            ace_type: ACCESS_ALLOWED_ACE_TYPE,
            flags: 0,
            mask,
            sid,
        }
    }

    pub fn denied(sid: Sid, mask: u32) -> Self {
        Ace {
            ace_type: ACCESS_DENIED_ACE_TYPE,
            flags: 0,
            mask,
            sid,
        }
    }

    pub fn is_inherit_only(&self) -> bool {
        self.flags & INHERIT_ONLY_ACE != 0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SecurityDescriptor {
    pub owner: Option<Sid>,
    pub group: Option<Sid>,
    /// `None` is a null DACL (no restriction).
    pub dacl: Option<Vec<Ace>>,
}

impl SecurityDescriptor {
    pub fn parse(bytes: &[u8]) -> Result<Self, String> {
        decode(bytes).map_err(|e| format!("malformed security descriptor: {e}"))
    }

    /// Encode as a self-relative descriptor: owner, group, then DACL.
    pub fn to_bytes(&self) -> io::Result<Vec<u8>> {
        let mut body = Vec::new();
        let place_sid = |sid: &Option<Sid>, body: &mut Vec<u8>| -> io::Result<Option<usize>> {
            match sid {
                Some(s) => {
                    let off = HEADER_LEN + body.len();
                    s.write(body)?;
                    Ok(Some(off))
                }
                None => Ok(None),
            }
        };
        let owner_off = place_sid(&self.owner, &mut body)?;
        let group_off = place_sid(&self.group, &mut body)?;
        let dacl_off = match &self.dacl {
            Some(aces) => {
                let off = HEADER_LEN + body.len();
                let size = ACL_HEADER_LEN + aces.iter().map(|a| 8 + a.sid.encoded_len()).sum::<usize>();
                write_acl(&mut body, aces, size)?;
                Some(off)
            }
            None => None,
        };

        let mut control = SE_SELF_RELATIVE;
        if dacl_off.is_some() {
            control |= SE_DACL_PRESENT;
        }
        let mut out = Vec::with_capacity(HEADER_LEN + body.len());
        write_header(&mut out, control, owner_off, group_off, dacl_off)?;
        out.extend_from_slice(&body);
        Ok(out)
    }
}

fn write_header(
    out: &mut Vec<u8>,
    control: u16,
    owner: Option<usize>,
    group: Option<usize>,
    dacl: Option<usize>,
) -> io::Result<()> {
    out.write_u8(1)?;
    out.write_u8(0)?;
    out.write_u16::<LittleEndian>(control)?;
    out.write_u32::<LittleEndian>(owner.unwrap_or(0) as u32)?;
    out.write_u32::<LittleEndian>(group.unwrap_or(0) as u32)?;
    out.write_u32::<LittleEndian>(0)?;
    out.write_u32::<LittleEndian>(dacl.unwrap_or(0) as u32)?;
    Ok(())
}

fn write_acl(out: &mut Vec<u8>, aces: &[Ace], size: usize) -> io::Result<()> {
    out.write_u8(2)?;
    out.write_u8(0)?;
    out.write_u16::<LittleEndian>(size as u16)?;
    out.write_u16::<LittleEndian>(aces.len() as u16)?;
    out.write_u16::<LittleEndian>(0)?;
    for ace in aces {
        out.write_u8(ace.ace_type)?;
        out.write_u8(ace.flags)?;
        out.write_u16::<LittleEndian>((8 + ace.sid.encoded_len()) as u16)?;
        out.write_u32::<LittleEndian>(ace.mask)?;
        ace.sid.write(out)?;
    }
    Ok(())
}

fn decode(bytes: &[u8]) -> io::Result<SecurityDescriptor> {
    if bytes.len() < HEADER_LEN {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("{} bytes, header needs {HEADER_LEN}", bytes.len()),
        ));
    }
    let mut cur = Cursor::new(bytes);
    let _revision = cur.read_u8()?;
    let _sbz1 = cur.read_u8()?;
    let control = cur.read_u16::<LittleEndian>()?;
    let owner_off = cur.read_u32::<LittleEndian>()?;
    let group_off = cur.read_u32::<LittleEndian>()?;
    let _sacl_off = cur.read_u32::<LittleEndian>()?;
    let dacl_off = cur.read_u32::<LittleEndian>()?;

    let owner = read_sid_at(&mut cur, owner_off)?;
    let group = read_sid_at(&mut cur, group_off)?;
    let dacl = if control & SE_DACL_PRESENT != 0 && dacl_off != 0 {
        Some(read_acl_at(&mut cur, dacl_off)?)
    } else {
        None
    };
    Ok(SecurityDescriptor { owner, group, dacl })
}

fn read_sid_at(cur: &mut Cursor<&[u8]>, offset: u32) -> io::Result<Option<Sid>> {
    if offset == 0 {
        return Ok(None);
    }
    cur.seek(SeekFrom::Start(offset as u64))?;
    Sid::read(cur).map(Some)
}

fn read_acl_at(cur: &mut Cursor<&[u8]>, offset: u32) -> io::Result<Vec<Ace>> {
    cur.seek(SeekFrom::Start(offset as u64))?;
    let _revision = cur.read_u8()?;
    let _sbz1 = cur.read_u8()?;
    let _size = cur.read_u16::<LittleEndian>()?;
    let count = cur.read_u16::<LittleEndian>()?;
    let _sbz2 = cur.read_u16::<LittleEndian>()?;

    let mut aces = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let start = cur.position();
        let ace_type = cur.read_u8()?;
        let flags = cur.read_u8()?;
        let size = cur.read_u16::<LittleEndian>()?;
        if (size as usize) < 8 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("ACE of {size} bytes"),
            ));
        }
        if ace_type == ACCESS_ALLOWED_ACE_TYPE || ace_type == ACCESS_DENIED_ACE_TYPE {
            let mask = cur.read_u32::<LittleEndian>()?;
            let sid = Sid::read(cur)?;
            aces.push(Ace {
                ace_type,
                flags,
                mask,
                sid,
            });
        }
        // Object and callback ACEs have other layouts: step over them.
        cur.seek(SeekFrom::Start(start + size as u64))?;
    }
    Ok(aces)
}
