//! Device instance and per-connection dispatch.
//!
//! One `Device` stands for the loaded driver: it owns the backing-file
//! slot and the VBLK worker pool. Each `open` yields a `Connection`, the
//! unit the IOCTL surface operates on. Connections move through
//! `Opened -> Mapped -> Closing -> Closed`; dispatches may arrive
//! concurrently from any number of caller threads.

use std::sync::{Arc, RwLock};

use crossbeam::channel::{self, TrySendError};
use log::{info, trace, warn};

use colxring::ioctl::{MapInfoOut, Opcode, RwHdr, SubmitHdr};
use colxring::{COLX_VER_1, OP_READ, OP_WRITE};

use crate::backing::Backing;
use crate::dispatch::{Completion, Ioctl, PendingIo, Reply};
use crate::region::SharedRegion;
use crate::vblk::{self, InFlight, Pool, Work};
use crate::{vtty, Error, Result};

pub struct Device {
    backing: Arc<Backing>,
    pool: Pool,
}

impl Device {
    /// Bring the driver up with `workers` block-I/O threads.
    pub fn new(workers: usize) -> Self {
        Self {
            backing: Arc::new(Backing::new()),
            pool: Pool::new(workers),
        }
    }

    pub fn open(&self) -> Connection<'_> {
        trace!("connection opened");
        Connection {
            dev: self,
            ctx: RwLock::new(FileCtx {
                stage: Stage::Opened,
                region: None,
            }),
            inflight: InFlight::new(),
        }
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        // Unload order: fail the backing slot first so queued work bails
        // out not-ready, then the pool joins its workers as it drops.
        self.backing.close();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Opened,
    Mapped,
    Closing,
    Closed,
}

struct FileCtx {
    stage: Stage,
    region: Option<SharedRegion>,
}

pub struct Connection<'d> {
    dev: &'d Device,
    ctx: RwLock<FileCtx>,
    inflight: Arc<InFlight>,
}

fn buffered<'b>(req: &'b Ioctl<'_>) -> Result<(&'b [u8], usize)> {
    match req {
        Ioctl::Buffered { input, out_max } => Ok((*input, *out_max)),
        // A buffered opcode dispatched with a caller mapping (or the
        // other way around) is the missing-MDL shape.
        _ => Err(Error::InvalidParameter),
    }
}

impl Connection<'_> {
    /// Route one control request. Every path completes the request
    /// exactly once: in place, or later through the returned pending
    /// handle.
    pub fn device_control(&self, code: u32, req: Ioctl<'_>) -> Completion {
        let Some(op) = Opcode::from_code(code) else {
            warn!("unknown ioctl code {code:#010x}");
            return Completion::Done(Err(Error::InvalidDeviceRequest));
        };
        if self.detached() {
            return Completion::Done(Err(Error::InvalidHandle));
        }
        match op {
            Opcode::MapShared => Completion::Done(self.map_shared(req)),
            Opcode::RunTick => Completion::Done(self.run_tick(req)),
            Opcode::VblkSubmit => match self.vblk_submit(req) {
                Ok(pending) => Completion::Pending(pending),
                Err(e) => Completion::Done(Err(e)),
            },
            Opcode::VblkRead => Completion::Done(self.vblk_read(req)),
            Opcode::VblkWrite => Completion::Done(self.vblk_write(req)),
            Opcode::VblkSetBacking => Completion::Done(self.vblk_set_backing(req)),
            Opcode::VttyPush => Completion::Done(self.vtty_push(req)),
            Opcode::VttyPull => Completion::Done(self.vtty_pull(req)),
        }
    }

    fn detached(&self) -> bool {
        matches!(
            self.ctx.read().unwrap().stage,
            Stage::Closing | Stage::Closed
        )
    }

    fn map_shared(&self, req: Ioctl<'_>) -> Result<Reply> {
        let (input, out_max) = buffered(&req)?;
        if input.len() < 4 || out_max < MapInfoOut::SIZE {
            return Err(Error::BufferTooSmall);
        }
        let pages = u32::from_le_bytes(input[..4].try_into().unwrap());

        let mut ctx = self.ctx.write().unwrap();
        match ctx.stage {
            Stage::Closing | Stage::Closed => return Err(Error::InvalidHandle),
            // First map wins; a second map is rejected rather than leaked.
            Stage::Mapped => return Err(Error::DeviceNotReady),
            Stage::Opened => {}
        }
        let region = SharedRegion::create(pages)?;
        let out = MapInfoOut {
            user_base: region.user_base().into(),
            kernel_base: region.kernel_base().into(),
            size: (region.size() as u64).into(),
            ver: COLX_VER_1.into(),
            flags: 0u32.into(),
            ..Default::default()
        };
        info!("mapped {} pages ({} bytes)", pages, region.size());
        ctx.region = Some(region);
        ctx.stage = Stage::Mapped;
        Ok(Reply::with_data(out.to_bytes().to_vec()))
    }

    fn run_tick(&self, req: Ioctl<'_>) -> Result<Reply> {
        buffered(&req)?;
        let ctx = self.ctx.read().unwrap();
        let region = match (ctx.stage, ctx.region.as_ref()) {
            (Stage::Mapped, Some(region)) => region,
            _ => return Err(Error::InvalidHandle),
        };
        let hdr = region.hdr().ok_or(Error::DeviceNotReady)?;
        let tick = hdr.bump_tick();
        let ping = hdr.ping_req();
        if ping != hdr.ping_resp() {
            hdr.set_ping_resp(ping);
        }
        // Tick is the designated safe point for passive maintenance.
        vblk::scan_ring(region, &self.dev.backing);
        trace!("tick {tick}, ping {ping}");
        Ok(Reply::empty())
    }

    fn vblk_submit(&self, req: Ioctl<'_>) -> Result<PendingIo> {
        let (input, out_max) = buffered(&req)?;
        if input.len() < SubmitHdr::SIZE {
            return Err(Error::BufferTooSmall);
        }
        let hdr = SubmitHdr::parse(input).ok_or(Error::InvalidParameter)?;
        let (op, lba, len) = (hdr.op, hdr.lba.get(), hdr.len.get());
        if op != OP_READ && op != OP_WRITE {
            return Err(Error::InvalidParameter);
        }
        let file = self.dev.backing.get()?;
        vblk::validate(lba, len)?;

        let payload = if op == OP_WRITE {
            // Capture the payload; the caller's buffer is dead to us the
            // moment this returns pending.
            let body = &input[SubmitHdr::SIZE..];
            if body.len() < len as usize {
                return Err(Error::BufferTooSmall);
            }
            Some(body[..len as usize].to_vec())
        } else {
            if out_max < len as usize {
                return Err(Error::BufferTooSmall);
            }
            None
        };

        let (done, rx) = channel::bounded(1);
        let work = Work {
            op,
            lba,
            len,
            payload,
            file,
            backing: Arc::clone(&self.dev.backing),
            done,
            guard: self.inflight.guard(),
        };
        match self.dev.pool.sender().try_send(work) {
            Ok(()) => Ok(PendingIo { rx }),
            Err(TrySendError::Full(_)) => Err(Error::InsufficientResources),
            Err(TrySendError::Disconnected(_)) => Err(Error::Cancelled),
        }
    }

    fn vblk_read(&self, req: Ioctl<'_>) -> Result<Reply> {
        let Ioctl::DirectOut { input, data } = req else {
            return Err(Error::InvalidParameter);
        };
        let file = self.dev.backing.get()?;
        let hdr = RwHdr::parse(input).ok_or(Error::InvalidParameter)?;
        let n = vblk::direct_read(&file, hdr.lba.get(), hdr.len.get(), data)?;
        Ok(Reply::moved(n))
    }

    fn vblk_write(&self, req: Ioctl<'_>) -> Result<Reply> {
        let Ioctl::DirectIn { input, data } = req else {
            return Err(Error::InvalidParameter);
        };
        let file = self.dev.backing.get()?;
        let hdr = RwHdr::parse(input).ok_or(Error::InvalidParameter)?;
        vblk::direct_write(&file, hdr.lba.get(), hdr.len.get(), data)?;
        Ok(Reply::empty())
    }

    fn vblk_set_backing(&self, req: Ioctl<'_>) -> Result<Reply> {
        let (input, _) = buffered(&req)?;
        self.dev.backing.set_from_utf16(input)?;
        Ok(Reply::empty())
    }

    fn vtty_push(&self, req: Ioctl<'_>) -> Result<Reply> {
        let (input, _) = buffered(&req)?;
        let ctx = self.ctx.read().unwrap();
        let region = ctx.region.as_ref().ok_or(Error::InvalidParameter)?;
        let n = vtty::push(region, input)?;
        Ok(Reply::moved(n))
    }

    fn vtty_pull(&self, req: Ioctl<'_>) -> Result<Reply> {
        let (_, out_max) = buffered(&req)?;
        let ctx = self.ctx.read().unwrap();
        let region = ctx.region.as_ref().ok_or(Error::InvalidParameter)?;
        let mut buf = vec![0u8; out_max];
        let n = vtty::pull(region, &mut buf)?;
        buf.truncate(n);
        Ok(Reply::with_data(buf))
    }

    /// Tear the connection down: stop accepting dispatches, cancel and
    /// drain in-flight block work, release the mapping. Idempotent. A
    /// submit racing past the stage check still completes (cancelled);
    /// it only touches its own completion channel, never this state.
    pub fn cleanup(&self) {
        {
            let mut ctx = self.ctx.write().unwrap();
            match ctx.stage {
                Stage::Closing | Stage::Closed => return,
                _ => ctx.stage = Stage::Closing,
            }
        }
        self.inflight.begin_close();
        self.inflight.drain();
        let mut ctx = self.ctx.write().unwrap();
        ctx.region = None;
        ctx.stage = Stage::Closed;
        trace!("connection closed");
    }
}

impl Drop for Connection<'_> {
    fn drop(&mut self) {
        self.cleanup();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backing::encode_utf16_path;
    use colxring::ioctl::{
        IOCTL_MAP_SHARED, IOCTL_RUN_TICK, IOCTL_VBLK_READ, IOCTL_VBLK_SET_BACKING,
        IOCTL_VBLK_SUBMIT, IOCTL_VBLK_WRITE, IOCTL_VTTY_PULL, IOCTL_VTTY_PUSH,
    };
    use colxring::view::{HdrView, VttyView};
    use colxring::{VTTY_RX_OFF, VTTY_TX_OFF};
    use tempfile::NamedTempFile;

    fn map(conn: &Connection<'_>, pages: u32) -> MapInfoOut {
        let input = pages.to_le_bytes();
        let reply = conn
            .device_control(
                IOCTL_MAP_SHARED,
                Ioctl::Buffered {
                    input: &input,
                    out_max: 64,
                },
            )
            .wait()
            .unwrap();
        assert_eq!(reply.info, MapInfoOut::SIZE);
        MapInfoOut::parse(&reply.data).unwrap()
    }

    fn set_backing(conn: &Connection<'_>, file: &NamedTempFile) {
        let path = encode_utf16_path(file.path().to_str().unwrap());
        conn.device_control(
            IOCTL_VBLK_SET_BACKING,
            Ioctl::Buffered {
                input: &path,
                out_max: 0,
            },
        )
        .wait()
        .unwrap();
    }

    fn zero_file(len: u64) -> NamedTempFile {
        let f = NamedTempFile::new().unwrap();
        f.as_file().set_len(len).unwrap();
        f
    }

    fn submit(op: u8, lba: u64, len: u32, payload: &[u8]) -> Vec<u8> {
        let mut input = SubmitHdr {
            op,
            lba: lba.into(),
            len: len.into(),
            ..Default::default()
        }
        .to_bytes()
        .to_vec();
        input.extend_from_slice(payload);
        input
    }

    fn init_logging() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    #[test]
    fn map_tick_ping() {
        init_logging();
        let dev = Device::new(1);
        let conn = dev.open();
        let info = map(&conn, 16);
        assert_eq!(info.size.get(), 65536);
        assert_eq!(info.ver.get(), COLX_VER_1);
        assert_ne!(info.user_base.get(), 0);
        assert_ne!(info.kernel_base.get(), info.user_base.get());

        // The guest pokes ping_req through its own view of the mapping.
        let guest = unsafe { HdrView::from_ptr(info.user_base.get() as *mut u8) };
        guest.set_ping_req(7);
        conn.device_control(IOCTL_RUN_TICK, Ioctl::none())
            .wait()
            .unwrap();
        assert_eq!(guest.tick_count(), 1);
        assert_eq!(guest.ping_resp(), 7);

        conn.device_control(IOCTL_RUN_TICK, Ioctl::none())
            .wait()
            .unwrap();
        assert_eq!(guest.tick_count(), 2);
    }

    #[test]
    fn remap_rejected_state_unchanged() {
        let dev = Device::new(1);
        let conn = dev.open();
        let first = map(&conn, 16);
        let input = 8u32.to_le_bytes();
        let err = conn
            .device_control(
                IOCTL_MAP_SHARED,
                Ioctl::Buffered {
                    input: &input,
                    out_max: 64,
                },
            )
            .wait()
            .unwrap_err();
        assert!(matches!(err, Error::DeviceNotReady));
        // Original mapping still live and ticking.
        conn.device_control(IOCTL_RUN_TICK, Ioctl::none())
            .wait()
            .unwrap();
        let guest = unsafe { HdrView::from_ptr(first.user_base.get() as *mut u8) };
        assert_eq!(guest.tick_count(), 1);
    }

    #[test]
    fn map_buffer_checks() {
        let dev = Device::new(1);
        let conn = dev.open();
        let input = 16u32.to_le_bytes();
        for (inp, out_max) in [(&input[..2], 64), (&input[..], MapInfoOut::SIZE - 1)] {
            let err = conn
                .device_control(
                    IOCTL_MAP_SHARED,
                    Ioctl::Buffered {
                        input: inp,
                        out_max,
                    },
                )
                .wait()
                .unwrap_err();
            assert!(matches!(err, Error::BufferTooSmall));
        }
        // Failed maps leave the connection mappable.
        map(&conn, 1);
    }

    #[test]
    fn tick_requires_mapping() {
        let dev = Device::new(1);
        let conn = dev.open();
        let err = conn
            .device_control(IOCTL_RUN_TICK, Ioctl::none())
            .wait()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidHandle));
    }

    #[test]
    fn buffered_vblk_roundtrip() {
        init_logging();
        let dev = Device::new(2);
        let conn = dev.open();
        let file = zero_file(1 << 20);
        set_backing(&conn, &file);

        let payload = [0xaau8; 512];
        let completion = conn.device_control(
            IOCTL_VBLK_SUBMIT,
            Ioctl::Buffered {
                input: &submit(OP_WRITE, 0, 512, &payload),
                out_max: 0,
            },
        );
        assert!(completion.is_pending());
        let reply = completion.wait().unwrap();
        assert_eq!(reply.info, 0);

        let reply = conn
            .device_control(
                IOCTL_VBLK_SUBMIT,
                Ioctl::Buffered {
                    input: &submit(OP_READ, 0, 512, &[]),
                    out_max: 512,
                },
            )
            .wait()
            .unwrap();
        assert_eq!(reply.info, 512);
        assert_eq!(reply.data, payload);
    }

    #[test]
    fn misaligned_submit_rejected() {
        let dev = Device::new(1);
        let conn = dev.open();
        let file = zero_file(4096);
        set_backing(&conn, &file);
        let err = conn
            .device_control(
                IOCTL_VBLK_SUBMIT,
                Ioctl::Buffered {
                    input: &submit(OP_READ, 0, 513, &[]),
                    out_max: 1024,
                },
            )
            .wait()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidParameter));
    }

    #[test]
    fn submit_without_backing_not_ready() {
        let dev = Device::new(1);
        let conn = dev.open();
        let err = conn
            .device_control(
                IOCTL_VBLK_SUBMIT,
                Ioctl::Buffered {
                    input: &submit(OP_READ, 0, 512, &[]),
                    out_max: 512,
                },
            )
            .wait()
            .unwrap_err();
        assert!(matches!(err, Error::DeviceNotReady));
    }

    #[test]
    fn submit_read_output_too_small() {
        let dev = Device::new(1);
        let conn = dev.open();
        let file = zero_file(4096);
        set_backing(&conn, &file);
        let err = conn
            .device_control(
                IOCTL_VBLK_SUBMIT,
                Ioctl::Buffered {
                    input: &submit(OP_READ, 0, 1024, &[]),
                    out_max: 512,
                },
            )
            .wait()
            .unwrap_err();
        assert!(matches!(err, Error::BufferTooSmall));
    }

    #[test]
    fn submit_write_payload_truncated() {
        let dev = Device::new(1);
        let conn = dev.open();
        let file = zero_file(4096);
        set_backing(&conn, &file);
        // Declares 512 but only carries 100 payload bytes.
        let err = conn
            .device_control(
                IOCTL_VBLK_SUBMIT,
                Ioctl::Buffered {
                    input: &submit(OP_WRITE, 0, 512, &[0u8; 100]),
                    out_max: 0,
                },
            )
            .wait()
            .unwrap_err();
        assert!(matches!(err, Error::BufferTooSmall));
    }

    #[test]
    fn direct_paths_roundtrip() {
        let dev = Device::new(1);
        let conn = dev.open();
        let file = zero_file(1 << 20);
        set_backing(&conn, &file);

        let hdr = RwHdr {
            lba: 4.into(),
            len: 1024.into(),
            flags: 0u32.into(),
        }
        .to_bytes();
        let data = vec![0x17u8; 1024];
        let reply = conn
            .device_control(
                IOCTL_VBLK_WRITE,
                Ioctl::DirectIn {
                    input: &hdr,
                    data: &data,
                },
            )
            .wait()
            .unwrap();
        assert_eq!(reply.info, 0);

        let mut out = vec![0u8; 1024];
        let reply = conn
            .device_control(
                IOCTL_VBLK_READ,
                Ioctl::DirectOut {
                    input: &hdr,
                    data: &mut out,
                },
            )
            .wait()
            .unwrap();
        assert_eq!(reply.info, 1024);
        assert_eq!(out, data);
    }

    #[test]
    fn direct_with_buffered_payload_is_missing_mdl() {
        let dev = Device::new(1);
        let conn = dev.open();
        let file = zero_file(4096);
        set_backing(&conn, &file);
        let hdr = RwHdr {
            lba: 0.into(),
            len: 512.into(),
            flags: 0u32.into(),
        }
        .to_bytes();
        let err = conn
            .device_control(
                IOCTL_VBLK_READ,
                Ioctl::Buffered {
                    input: &hdr,
                    out_max: 512,
                },
            )
            .wait()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidParameter));
    }

    #[test]
    fn vtty_push_pull_through_ioctls() {
        let dev = Device::new(1);
        let conn = dev.open();
        let info = map(&conn, 0x61);
        let ubase = info.user_base.get() as *mut u8;

        // Host pushes, guest drains TX through its view.
        let reply = conn
            .device_control(
                IOCTL_VTTY_PUSH,
                Ioctl::Buffered {
                    input: b"Hello",
                    out_max: 0,
                },
            )
            .wait()
            .unwrap();
        assert_eq!(reply.info, 5);
        let guest_tx = unsafe { VttyView::from_ptr(ubase.add(VTTY_TX_OFF)) };
        let mut buf = [0u8; 4];
        assert_eq!(guest_tx.pull(&mut buf), 4);
        assert_eq!(&buf, b"Hell");
        assert_eq!(guest_tx.pull(&mut buf), 1);
        assert_eq!(&buf[..1], b"o");
        assert_eq!(guest_tx.pull(&mut buf), 0);

        // Guest produces into RX, host pulls through the IOCTL.
        let guest_rx = unsafe { VttyView::from_ptr(ubase.add(VTTY_RX_OFF)) };
        assert_eq!(guest_rx.push(b"ok\n"), 3);
        let reply = conn
            .device_control(
                IOCTL_VTTY_PULL,
                Ioctl::Buffered {
                    input: &[],
                    out_max: 16,
                },
            )
            .wait()
            .unwrap();
        assert_eq!(reply.info, 3);
        assert_eq!(reply.data, b"ok\n");
    }

    #[test]
    fn vtty_requires_mapping_that_holds_rings() {
        let dev = Device::new(1);
        let conn = dev.open();
        // No mapping at all.
        let err = conn
            .device_control(
                IOCTL_VTTY_PUSH,
                Ioctl::Buffered {
                    input: b"x",
                    out_max: 0,
                },
            )
            .wait()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidParameter));
        // 16 pages: mapped, but the ring rectangles are out of range.
        map(&conn, 16);
        let err = conn
            .device_control(
                IOCTL_VTTY_PUSH,
                Ioctl::Buffered {
                    input: b"x",
                    out_max: 0,
                },
            )
            .wait()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidParameter));
    }

    #[test]
    fn tick_services_guest_published_slots() {
        let dev = Device::new(1);
        let conn = dev.open();
        let file = zero_file(1 << 20);
        set_backing(&conn, &file);
        let info = map(&conn, 0x61);

        // Guest writes a payload into the arena, publishes a write slot.
        let guest_ring = unsafe {
            colxring::view::VblkRingView::from_region(
                info.user_base.get() as *mut u8,
                info.size.get() as usize,
            )
        };
        let payload = [0x3cu8; 512];
        assert!(guest_ring.write_arena(0, &payload));
        guest_ring.set_slot(
            0,
            &colxring::VblkSlot {
                id: 99.into(),
                op: OP_WRITE,
                lba: 8.into(),
                len: 512.into(),
                data_off: 0.into(),
                ..Default::default()
            },
        );
        guest_ring.set_prod(1);

        conn.device_control(IOCTL_RUN_TICK, Ioctl::none())
            .wait()
            .unwrap();
        assert_eq!(guest_ring.slot_status(0), colxring::ST_OK);
        assert_eq!(guest_ring.cons(), 1);

        // The bytes really hit the backing file.
        use std::os::unix::fs::FileExt;
        let mut check = [0u8; 512];
        file.as_file().read_exact_at(&mut check, 8 * 512).unwrap();
        assert_eq!(check, payload);
    }

    #[test]
    fn unknown_opcode_rejected() {
        let dev = Device::new(1);
        let conn = dev.open();
        let err = conn
            .device_control(0xdead_beef, Ioctl::none())
            .wait()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidDeviceRequest));
    }

    #[test]
    fn cleanup_is_idempotent_and_detaches() {
        let dev = Device::new(1);
        let conn = dev.open();
        map(&conn, 16);
        conn.cleanup();
        conn.cleanup();
        let err = conn
            .device_control(IOCTL_RUN_TICK, Ioctl::none())
            .wait()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidHandle));
        let input = 16u32.to_le_bytes();
        let err = conn
            .device_control(
                IOCTL_MAP_SHARED,
                Ioctl::Buffered {
                    input: &input,
                    out_max: 64,
                },
            )
            .wait()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidHandle));
    }

    #[test]
    fn cleanup_drains_pending_submits() {
        let dev = Device::new(2);
        let file = zero_file(1 << 20);
        let conn = dev.open();
        set_backing(&conn, &file);
        let pending: Vec<_> = (0..4)
            .map(|i| {
                conn.device_control(
                    IOCTL_VBLK_SUBMIT,
                    Ioctl::Buffered {
                        input: &submit(OP_WRITE, i * 8, 512, &[0x55; 512]),
                        out_max: 0,
                    },
                )
            })
            .collect();
        conn.cleanup();
        // Every accepted request completed exactly once, either with the
        // I/O result or with a cancel.
        for completion in pending {
            match completion.wait() {
                Ok(reply) => assert_eq!(reply.info, 0),
                Err(Error::Cancelled) => {}
                Err(e) => panic!("unexpected completion status {e:?}"),
            }
        }
    }

    #[test]
    fn unload_fails_queued_work_not_ready() {
        let file = zero_file(4096);
        let dev = Device::new(1);
        let conn = dev.open();
        set_backing(&conn, &file);
        drop(conn);
        // Device drop closes the backing; a fresh device must start cold.
        drop(dev);
        let dev2 = Device::new(1);
        let conn2 = dev2.open();
        let err = conn2
            .device_control(
                IOCTL_VBLK_SUBMIT,
                Ioctl::Buffered {
                    input: &submit(OP_READ, 0, 512, &[]),
                    out_max: 512,
                },
            )
            .wait()
            .unwrap_err();
        assert!(matches!(err, Error::DeviceNotReady));
    }
}
