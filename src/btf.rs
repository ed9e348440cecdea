//! Kernel struct offsets from BTF
//!
//! The probe reads `task_struct` and `mm_struct` fields through a table of
//! byte offsets instead of compiled-in layouts. This module builds that table
//! from the running kernel's BTF (`/sys/kernel/btf/vmlinux`) so one probe
//! binary works across kernel builds.
//!
//! Members nested in anonymous structs/unions are found too: `mm_struct` keeps
//! most of its fields in an anonymous randomized-layout block.

use crate::{OomKillError, Result};
use btf_rs::{Btf, Member, Type};
use oomkill_common::TaskOffsets;
use tracing::debug;

/// Default location of the kernel's own BTF.
pub const VMLINUX_BTF: &str = "/sys/kernel/btf/vmlinux";

pub struct KernelBtf {
    btf: Btf,
}

impl KernelBtf {
    /// Load the running kernel's BTF.
    pub fn from_sys_fs() -> Result<Self> {
        Self::from_file(VMLINUX_BTF)
    }

    pub fn from_file(path: &str) -> Result<Self> {
        debug!("Loading BTF from {}", path);
        let btf = Btf::from_file(path)
            .map_err(|e| OomKillError::BtfError(format!("{}: {}", path, e)))?;
        Ok(Self { btf })
    }

    /// Resolve every offset the mark-victim probe reads.
    pub fn task_offsets(&self) -> Result<TaskOffsets> {
        let offsets = TaskOffsets {
            task_real_parent: self.member_offset("task_struct", "real_parent")?,
            task_tgid: self.member_offset("task_struct", "tgid")?,
            task_mm: self.member_offset("task_struct", "mm")?,
            task_exit_code: self.member_offset("task_struct", "exit_code")?,
            mm_hiwater_rss: self.member_offset("mm_struct", "hiwater_rss")?,
            _padding: 0,
        };

        debug!("Resolved task offsets: {:?}", offsets);
        Ok(offsets)
    }

    /// Byte offset of `member` inside struct `type_name`.
    pub fn member_offset(&self, type_name: &str, member: &str) -> Result<u32> {
        let members = self.struct_members(type_name)?;

        let bits = self
            .find_member(&members, member, 0)?
            .ok_or_else(|| OomKillError::BtfMemberNotFound {
                type_name: type_name.to_string(),
                member: member.to_string(),
            })?;

        if bits % 8 != 0 {
            return Err(OomKillError::BtfMemberUnaligned {
                type_name: type_name.to_string(),
                member: member.to_string(),
            });
        }

        Ok(bits / 8)
    }

    fn struct_members(&self, type_name: &str) -> Result<Vec<Member>> {
        let types = self
            .btf
            .resolve_types_by_name(type_name)
            .map_err(|_| OomKillError::BtfTypeNotFound(type_name.to_string()))?;

        // Forward declarations share the name; take the definition.
        types
            .into_iter()
            .find_map(|t| match t {
                Type::Struct(s) => Some(s.members),
                _ => None,
            })
            .ok_or_else(|| OomKillError::BtfTypeNotFound(type_name.to_string()))
    }

    /// Depth-first search returning the member's offset in bits from the
    /// start of the outermost struct.
    fn find_member(&self, members: &[Member], name: &str, base_bits: u32) -> Result<Option<u32>> {
        for member in members {
            let bits = base_bits
                .checked_add(member.bit_offset())
                .ok_or_else(|| OomKillError::BtfError("member offset overflow".to_string()))?;

            let member_name = self
                .btf
                .resolve_name(member)
                .map_err(|e| OomKillError::BtfError(e.to_string()))?;

            if member_name == name {
                return Ok(Some(bits));
            }

            if member_name.is_empty() {
                if let Some(inner) = self.anonymous_members(member)? {
                    if let Some(found) = self.find_member(&inner, name, bits)? {
                        return Ok(Some(found));
                    }
                }
            }
        }

        Ok(None)
    }

    fn anonymous_members(&self, member: &Member) -> Result<Option<Vec<Member>>> {
        let resolved = self
            .btf
            .resolve_chained_type(member)
            .map_err(|e| OomKillError::BtfError(e.to_string()))?;

        Ok(match resolved {
            Type::Struct(s) => Some(s.members),
            Type::Union(u) => Some(u.members),
            _ => None,
        })
    }
}
