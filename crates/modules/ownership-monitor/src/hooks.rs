//! Declarative table of the chown syscall family.
//!
//! The seven variants differ only in shape; each table row records the
//! tracepoint name, the arity and how to normalize the raw arguments to the
//! common `(path-or-null, uid, gid)` signature. One generic dispatcher
//! consumes the table, so every variant keeps its own trampoline while
//! sharing a single correlation core.

use std::path::PathBuf;

use goshawk_core::event::EntryHandle;

/// Raw arguments of a syscall entry as delivered by the hook layer: the
/// scalar registers, the decoded string for the pathname argument when the
/// variant has one, and the handle of the filesystem entry being operated on
/// when the hook layer has already resolved it.
#[derive(Debug, Clone, Default)]
pub struct EntryArgs {
    pub scalars: [u64; 6],
    pub pathname: Option<PathBuf>,
    pub entry: Option<EntryHandle>,
}

/// The common shape every chown variant normalizes to.
///
/// Descriptor-based variants carry no pathname: the concrete path is never
/// re-derived from the descriptor here, it comes from the file-layer
/// resolution step at syscall exit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChownArgs {
    pub path: Option<PathBuf>,
    pub uid: u32,
    pub gid: u32,
}

pub struct VariantDef {
    pub name: &'static str,
    pub arity: usize,
    pub normalize: fn(&EntryArgs) -> ChownArgs,
}

/// `chown(path, uid, gid)` and the variants sharing its shape.
fn normalize_path(args: &EntryArgs) -> ChownArgs {
    ChownArgs {
        path: args.pathname.clone(),
        uid: args.scalars[1] as u32,
        gid: args.scalars[2] as u32,
    }
}

/// `fchown(fd, uid, gid)`: no pathname to capture.
fn normalize_fd(args: &EntryArgs) -> ChownArgs {
    ChownArgs {
        path: None,
        uid: args.scalars[1] as u32,
        gid: args.scalars[2] as u32,
    }
}

/// `fchownat(dirfd, path, uid, gid)`.
fn normalize_at(args: &EntryArgs) -> ChownArgs {
    ChownArgs {
        path: args.pathname.clone(),
        uid: args.scalars[2] as u32,
        gid: args.scalars[3] as u32,
    }
}

pub const CHOWN_VARIANTS: [VariantDef; 7] = [
    VariantDef {
        name: "chown",
        arity: 3,
        normalize: normalize_path,
    },
    VariantDef {
        name: "lchown",
        arity: 3,
        normalize: normalize_path,
    },
    VariantDef {
        name: "fchown",
        arity: 3,
        normalize: normalize_fd,
    },
    VariantDef {
        name: "chown16",
        arity: 3,
        normalize: normalize_path,
    },
    VariantDef {
        name: "lchown16",
        arity: 3,
        normalize: normalize_path,
    },
    VariantDef {
        name: "fchown16",
        arity: 3,
        normalize: normalize_fd,
    },
    VariantDef {
        name: "fchownat",
        arity: 4,
        normalize: normalize_at,
    },
];

/// The generic exit-observation tracepoint every exit path converges with.
pub const RAW_EXIT_TRACEPOINT: &str = "raw_syscalls/sys_exit";

pub fn variant(name: &str) -> Option<&'static VariantDef> {
    CHOWN_VARIANTS.iter().find(|variant| variant.name == name)
}

/// Enter/exit tracepoint pairs a loader would attach, one per variant.
pub fn attach_points() -> impl Iterator<Item = (String, String)> {
    CHOWN_VARIANTS.iter().map(|variant| {
        (
            format!("sys_enter_{}", variant.name),
            format!("sys_exit_{}", variant.name),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_variant_is_registered() {
        let names: Vec<_> = CHOWN_VARIANTS.iter().map(|v| v.name).collect();
        assert_eq!(
            names,
            [
                "chown", "lchown", "fchown", "chown16", "lchown16", "fchown16", "fchownat"
            ]
        );
        assert_eq!(attach_points().count(), 7);
        assert!(variant("chown32").is_none());
        assert!(CHOWN_VARIANTS.iter().all(|v| match v.name {
            "fchownat" => v.arity == 4,
            _ => v.arity == 3,
        }));
    }

    #[test]
    fn fchownat_reads_uid_gid_after_dirfd_and_path() {
        let args = EntryArgs {
            scalars: [3, 0, 1000, 1001, 0, 0],
            pathname: Some(PathBuf::from("relative/name")),
            entry: None,
        };
        let normalized = (variant("fchownat").unwrap().normalize)(&args);
        assert_eq!(normalized.path, Some(PathBuf::from("relative/name")));
        assert_eq!(normalized.uid, 1000);
        assert_eq!(normalized.gid, 1001);
    }

    #[test]
    fn descriptor_variants_never_carry_a_path() {
        for name in ["fchown", "fchown16"] {
            let args = EntryArgs {
                scalars: [3, 0, 0, 0, 0, 0],
                // even if the hook layer hands over garbage in the pathname
                // slot, the fd shape ignores it
                pathname: Some(PathBuf::from("/bogus")),
                entry: None,
            };
            let normalized = (variant(name).unwrap().normalize)(&args);
            assert_eq!(normalized.path, None);
        }
    }
}
