//! FUSE dispatch glue.
//!
//! fuser addresses nodes by inode while the core addresses them by path, so
//! this layer keeps a bidirectional inode table and translates each VFS
//! callback into the matching core entry point, mapping `FsError` straight
//! to an errno reply.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::time::{Duration, SystemTime};

use fuser::{
    FileType, Filesystem, KernelConfig, ReplyAttr, ReplyCreate, ReplyData, ReplyDirectory,
    ReplyEmpty, ReplyEntry, ReplyOpen, ReplyStatfs, ReplyXattr, Request, TimeOrNow,
    FUSE_ROOT_ID,
};

use fabricfs::{FabricFs, FileAttr, FileKind, XattrReply};

/// How long the kernel may cache entries and attributes.
const TTL: Duration = Duration::from_secs(1);

/// Bidirectional inode <-> path table. Inode 1 is the root; files keep
/// their inode for as long as the registry entry exists.
struct InodeTable {
    next: u64,
    by_ino: HashMap<u64, String>,
    by_path: HashMap<String, u64>,
}

impl InodeTable {
    fn new() -> Self {
        Self {
            next: FUSE_ROOT_ID + 1,
            by_ino: HashMap::new(),
            by_path: HashMap::new(),
        }
    }

    fn get_or_assign(&mut self, path: &str) -> u64 {
        if let Some(ino) = self.by_path.get(path) {
            return *ino;
        }
        let ino = self.next;
        self.next += 1;
        self.by_ino.insert(ino, path.to_string());
        self.by_path.insert(path.to_string(), ino);
        ino
    }

    fn path_of(&self, ino: u64) -> Option<&str> {
        self.by_ino.get(&ino).map(String::as_str)
    }

    fn forget(&mut self, path: &str) {
        if let Some(ino) = self.by_path.remove(path) {
            self.by_ino.remove(&ino);
        }
    }
}

pub struct FabricMount {
    fs: FabricFs,
    inodes: InodeTable,
    uid: u32,
    gid: u32,
}

impl FabricMount {
    pub fn new(fs: FabricFs) -> Self {
        Self {
            fs,
            inodes: InodeTable::new(),
            uid: unsafe { libc::getuid() },
            gid: unsafe { libc::getgid() },
        }
    }

    fn child_path(name: &OsStr) -> Result<String, i32> {
        match name.to_str() {
            Some(name) => Ok(format!("/{}", name)),
            None => Err(libc::EINVAL),
        }
    }

    fn to_fuse_attr(&self, ino: u64, attr: &FileAttr) -> fuser::FileAttr {
        let kind = match attr.kind {
            FileKind::Directory => FileType::Directory,
            FileKind::Regular => FileType::RegularFile,
        };
        fuser::FileAttr {
            ino,
            size: attr.size,
            blocks: (attr.size + 511) / 512,
            atime: attr.accessed,
            mtime: attr.modified,
            ctime: attr.modified,
            crtime: attr.created,
            kind,
            perm: attr.mode as u16,
            nlink: attr.nlink,
            uid: self.uid,
            gid: self.gid,
            rdev: 0,
            blksize: 4096,
            flags: 0,
        }
    }

    fn stat(&mut self, ino: u64) -> Result<fuser::FileAttr, i32> {
        let path = match ino {
            FUSE_ROOT_ID => "/".to_string(),
            _ => self
                .inodes
                .path_of(ino)
                .ok_or(libc::ENOENT)?
                .to_string(),
        };
        let attr = self.fs.getattr(&path).map_err(|e| e.errno())?;
        Ok(self.to_fuse_attr(ino, &attr))
    }
}

fn resolve(time: Option<TimeOrNow>) -> Option<SystemTime> {
    time.map(|t| match t {
        TimeOrNow::SpecificTime(t) => t,
        TimeOrNow::Now => SystemTime::now(),
    })
}

impl Filesystem for FabricMount {
    fn init(&mut self, _req: &Request<'_>, _config: &mut KernelConfig) -> Result<(), i32> {
        log::info!("filesystem dispatcher attached");
        Ok(())
    }

    fn destroy(&mut self) {
        self.fs.destroy();
    }

    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        if parent != FUSE_ROOT_ID {
            reply.error(libc::ENOENT);
            return;
        }
        let path = match Self::child_path(name) {
            Ok(path) => path,
            Err(errno) => return reply.error(errno),
        };
        match self.fs.getattr(&path) {
            Ok(attr) => {
                let ino = self.inodes.get_or_assign(&path);
                reply.entry(&TTL, &self.to_fuse_attr(ino, &attr), 0);
            }
            Err(e) => reply.error(e.errno()),
        }
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, reply: ReplyAttr) {
        match self.stat(ino) {
            Ok(attr) => reply.attr(&TTL, &attr),
            Err(errno) => reply.error(errno),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn setattr(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _mode: Option<u32>,
        _uid: Option<u32>,
        _gid: Option<u32>,
        size: Option<u64>,
        atime: Option<TimeOrNow>,
        mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        let path = match self.inodes.path_of(ino) {
            Some(path) => path.to_string(),
            None => return reply.error(libc::ENOENT),
        };

        if let Some(size) = size {
            if size > i64::MAX as u64 {
                return reply.error(libc::EINVAL);
            }
            if let Err(e) = self.fs.truncate(&path, size as i64) {
                return reply.error(e.errno());
            }
        }

        if atime.is_some() || mtime.is_some() {
            if let Err(e) = self.fs.utimens(&path, resolve(atime), resolve(mtime)) {
                return reply.error(e.errno());
            }
        }

        match self.stat(ino) {
            Ok(attr) => reply.attr(&TTL, &attr),
            Err(errno) => reply.error(errno),
        }
    }

    fn create(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        _mode: u32,
        _umask: u32,
        _flags: i32,
        reply: ReplyCreate,
    ) {
        if parent != FUSE_ROOT_ID {
            reply.error(libc::ENOENT);
            return;
        }
        let path = match Self::child_path(name) {
            Ok(path) => path,
            Err(errno) => return reply.error(errno),
        };
        if let Err(e) = self.fs.create(&path) {
            return reply.error(e.errno());
        }
        let ino = self.inodes.get_or_assign(&path);
        match self.stat(ino) {
            Ok(attr) => reply.created(&TTL, &attr, 0, 0, 0),
            Err(errno) => reply.error(errno),
        }
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, _flags: i32, reply: ReplyOpen) {
        let path = match self.inodes.path_of(ino) {
            Some(path) => path.to_string(),
            None => return reply.error(libc::ENOENT),
        };
        match self.fs.open(&path) {
            Ok(()) => reply.opened(0, 0),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        let path = match self.inodes.path_of(ino) {
            Some(path) => path.to_string(),
            None => return reply.error(libc::ENOENT),
        };
        match self.fs.read_at(&path, size, offset) {
            Ok(bytes) => reply.data(&bytes),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        if ino != FUSE_ROOT_ID {
            reply.error(libc::ENOTDIR);
            return;
        }
        for (i, name) in self.fs.readdir().iter().enumerate().skip(offset as usize) {
            let (entry_ino, kind) = match name.as_str() {
                "." | ".." => (FUSE_ROOT_ID, FileType::Directory),
                _ => (
                    self.inodes.get_or_assign(&format!("/{}", name)),
                    FileType::RegularFile,
                ),
            };
            if reply.add(entry_ino, (i + 1) as i64, kind, name) {
                break;
            }
        }
        reply.ok();
    }

    fn unlink(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        if parent != FUSE_ROOT_ID {
            reply.error(libc::ENOENT);
            return;
        }
        let path = match Self::child_path(name) {
            Ok(path) => path,
            Err(errno) => return reply.error(errno),
        };
        match self.fs.unlink(&path) {
            Ok(()) => {
                self.inodes.forget(&path);
                reply.ok();
            }
            Err(e) => reply.error(e.errno()),
        }
    }

    fn getxattr(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        name: &OsStr,
        size: u32,
        reply: ReplyXattr,
    ) {
        let path = match self.inodes.path_of(ino) {
            Some(path) => path.to_string(),
            None => return reply.error(libc::ENOENT),
        };
        let name = match name.to_str() {
            Some(name) => name,
            None => return reply.error(libc::ENODATA),
        };
        match self.fs.getxattr(&path, name, size) {
            Ok(XattrReply::Size(len)) => reply.size(len),
            Ok(XattrReply::Data(bytes)) => reply.data(&bytes),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn setxattr(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        name: &OsStr,
        value: &[u8],
        _flags: i32,
        _position: u32,
        reply: ReplyEmpty,
    ) {
        let path = match self.inodes.path_of(ino) {
            Some(path) => path.to_string(),
            None => return reply.error(libc::ENOENT),
        };
        let name = match name.to_str() {
            Some(name) => name,
            None => return reply.error(libc::EINVAL),
        };
        match self.fs.setxattr(&path, name, value) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn listxattr(&mut self, _req: &Request<'_>, ino: u64, size: u32, reply: ReplyXattr) {
        let path = match ino {
            FUSE_ROOT_ID => "/".to_string(),
            _ => match self.inodes.path_of(ino) {
                Some(path) => path.to_string(),
                None => return reply.error(libc::ENOENT),
            },
        };
        if path == "/" {
            // The root carries no attributes.
            if size == 0 {
                return reply.size(0);
            }
            return reply.data(&[]);
        }
        match self.fs.listxattr(&path, size) {
            Ok(XattrReply::Size(len)) => reply.size(len),
            Ok(XattrReply::Data(bytes)) => reply.data(&bytes),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn statfs(&mut self, _req: &Request<'_>, _ino: u64, reply: ReplyStatfs) {
        // Synthesized from allocation stats so `df` shows something
        // sensible; there is no real block device behind the mount.
        let stats = self.fs.stats();
        let bsize: u32 = 4096;
        let used_blocks = (stats.bytes_live + bsize as u64 - 1) / bsize as u64;
        reply.statfs(
            used_blocks,
            0,
            0,
            self.fs.entry_count() as u64,
            0,
            bsize,
            self.fs.config().max_path_len as u32,
            bsize,
        );
    }
}
