//! 命名共享内存环形缓冲区：注册表、每进程句柄表与地址空间绑定器。
//!
//! 一个环由 16 个物理连续的负载页（payload）和 1 个 book 页组成，
//! book 页保存生产者/消费者两个缓存行对齐的原子计数器。每个所有者的
//! 地址空间中，负载页被连续映射两次（所谓 "魔术" 双重映射），
//! 这样从负载区中任意位置开始、长度不超过 `RINGBUF_PAGES` 页的线性读取
//! 都不会跨越缓冲区末端而需要特殊处理。
//!
//! 内核自身不会在运行期间访问负载区的内容——它只负责页面的分配、映射、
//! 归零和回收，生产者/消费者协议完全由用户态的两个所有者实现。

use core::sync::atomic::AtomicU64;

use array_macro::array;

use crate::consts::ipc::{
    MAX_RINGS, MAX_RINGS_PER_PROC, MAX_RING_OWNERS, RINGBUF_PAGES, RINGBUF_SIZE,
    RING_NAME_BUF, RING_NAME_MAX, RING_REGION_PAGES, RING_REGION_SIZE,
};
use crate::consts::PGSIZE;
use crate::mm::{pg_round_up, PageTable, PhysAddr, PteFlag, RawPage, RawRingPages, RawSinglePage, VirtAddr};
use crate::spinlock::SpinLock;

/// `ringbuf` 系统调用的操作码。
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum RingOp {
    /// 解除当前进程对该名称环的绑定。
    Close = 0,
    /// 绑定一个已存在的环，或在不存在时创建它。
    Open = 1,
}

/// book 页中独占一条缓存行的原子计数器，避免生产者/消费者之间的伪共享。
#[repr(C, align(64))]
struct CacheLine(AtomicU64);

/// book 页的逻辑布局：生产者下标与消费者下标。
///
/// 该结构体远小于一整页，实际以页首地址起步，页内剩余字节保持归零、未使用。
#[repr(C)]
struct RingBook {
    producer: CacheLine,
    consumer: CacheLine,
}

/// 每进程持有的环形缓冲区句柄。
///
/// 句柄表用 `[Option<RingHandle>; MAX_RINGS_PER_PROC]` 表示，
/// `None` 本身即代表未占用，不再需要单独的 in-use 标志位。
#[derive(Clone, Copy)]
pub struct RingHandle {
    name: [u8; RING_NAME_BUF],
    /// 该环在本进程地址空间中 33 页绑定区域的起始虚拟地址。
    pub user_base: usize,
}

/// 注册表中的一条环记录：名称、两段物理内存的内核指针、以及所有者集合。
struct RingSlot {
    name: [u8; RING_NAME_BUF],
    book: *mut u8,
    payload: *mut u8,
    owners: [Option<usize>; MAX_RING_OWNERS],
}

// RingSlot 仅在持有 RING_REGISTRY 自旋锁期间被访问，裸指针本身不跨越
// 该锁的边界被解引用，因此可以安全地在核间传递。
unsafe impl Send for RingSlot {}

struct RingRegistryInner {
    slots: [Option<RingSlot>; MAX_RINGS],
}

impl RingRegistryInner {
    const fn new() -> Self {
        Self {
            slots: array![_ => None; MAX_RINGS],
        }
    }
}

/// 全局环形缓冲区注册表，按名称索引，受单一自旋锁保护。
///
/// 结构上与 [`crate::process::ProcManager`] 的 `parents`/`pid` 字段一致：
/// 一把粗粒度锁即可，因为单次操作至多涉及 `MAX_RINGS` 次定长比较加少量页分配，
/// 锁持有期间不会发生睡眠。
static RING_REGISTRY: SpinLock<RingRegistryInner> =
    SpinLock::new(RingRegistryInner::new(), "ring_registry");

/// 校验用户提供的环名称，返回定长、NUL 填充的内部表示。
///
/// 合法长度为 `[1, RING_NAME_MAX]`（不含结尾 NUL）。
fn validate_name(raw: &[u8]) -> Result<[u8; RING_NAME_BUF], ()> {
    let len = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    if len == 0 || len > RING_NAME_MAX {
        return Err(())
    }
    let mut name = [0u8; RING_NAME_BUF];
    name[..len].copy_from_slice(&raw[..len]);
    Ok(name)
}

/// 在调用者的地址空间中安装一个环的双重映射。
///
/// # 功能说明
/// 在 `[cursor - RING_REGION_SIZE, cursor)` 处依次映射 book 页、负载页、
/// 以及负载页的魔术重复映射，三者权限均为用户可读写。
///
/// # 返回值
/// - `Ok(base)`：绑定区域的起始虚拟地址。
/// - `Err(())`：进程地址空间不足，或页表映射失败（已回滚已完成的部分映射）。
fn bind(
    pagetable: &mut PageTable,
    book: *mut u8,
    payload: *mut u8,
    cursor: usize,
    proc_size: usize,
) -> Result<usize, ()> {
    if cursor < RING_REGION_SIZE {
        return Err(())
    }
    let base = cursor - RING_REGION_SIZE;
    if base <= pg_round_up(proc_size) {
        return Err(())
    }

    let perm = PteFlag::R | PteFlag::W | PteFlag::U;
    let book_pa = unsafe { PhysAddr::from_raw(book as usize) };
    let payload_pa = unsafe { PhysAddr::from_raw(payload as usize) };

    pagetable
        .map_pages(unsafe { VirtAddr::from_raw(base) }, PGSIZE, book_pa, perm)
        .map_err(|_| ())?;

    if pagetable
        .map_pages(unsafe { VirtAddr::from_raw(base + PGSIZE) }, RINGBUF_SIZE, payload_pa, perm)
        .is_err()
    {
        pagetable.uvm_unmap(base, 1, false);
        return Err(())
    }

    if pagetable
        .map_pages(
            unsafe { VirtAddr::from_raw(base + PGSIZE + RINGBUF_SIZE) },
            RINGBUF_SIZE,
            payload_pa,
            perm,
        )
        .is_err()
    {
        pagetable.uvm_unmap(base, 1 + RINGBUF_PAGES, false);
        return Err(())
    }

    Ok(base)
}

/// 解除一个环在调用者地址空间中的双重映射。
///
/// 物理页面是否释放由注册表根据引用计数决定，这里总是保留物理内存
/// （`freeing = false`），因为该环可能仍有另一个所有者，或稍后被重新打开。
fn unbind(pagetable: &mut PageTable, base: usize) {
    pagetable.uvm_unmap(base, RING_REGION_PAGES, false);
}

/// 处理 `ringbuf(name, OPEN, &addr)`：查找或创建命名环，绑定到调用者地址空间。
fn ring_open(
    proc_index: usize,
    name: &[u8; RING_NAME_BUF],
    pagetable: &mut PageTable,
    handles: &mut [Option<RingHandle>; MAX_RINGS_PER_PROC],
    cursor: &mut usize,
    proc_size: usize,
) -> Result<usize, ()> {
    if handles.iter().flatten().any(|h| &h.name == name) {
        return Err(())
    }
    let handle_slot = handles.iter().position(Option::is_none).ok_or(())?;

    let mut registry = RING_REGISTRY.lock();
    let existing = registry.slots.iter().position(|s| matches!(s, Some(slot) if &slot.name == name));

    let reg_idx = match existing {
        Some(idx) => {
            let slot = registry.slots[idx].as_ref().unwrap();
            if slot.owners.iter().all(Option::is_some) {
                return Err(())
            }
            idx
        }
        None => {
            let idx = registry.slots.iter().position(Option::is_none).ok_or(())?;
            let book = unsafe { RawSinglePage::try_new_zeroed() }.map_err(|_| ())?;
            let payload = match unsafe { RawRingPages::try_new_zeroed() } {
                Ok(p) => p,
                Err(_) => {
                    unsafe { RawSinglePage::from_raw_and_drop(book); }
                    return Err(())
                }
            };
            registry.slots[idx] = Some(RingSlot {
                name: *name,
                book,
                payload,
                owners: array![_ => None; MAX_RING_OWNERS],
            });
            idx
        }
    };

    let (book, payload) = {
        let slot = registry.slots[reg_idx].as_ref().unwrap();
        (slot.book, slot.payload)
    };

    let base = match bind(pagetable, book, payload, *cursor, proc_size) {
        Ok(base) => base,
        Err(()) => {
            let slot = registry.slots[reg_idx].as_ref().unwrap();
            if slot.owners.iter().all(Option::is_none) {
                let slot = registry.slots[reg_idx].take().unwrap();
                unsafe {
                    RawSinglePage::from_raw_and_drop(slot.book);
                    RawRingPages::from_raw_and_drop(slot.payload);
                }
            }
            return Err(())
        }
    };
    *cursor = base;

    let slot = registry.slots[reg_idx].as_mut().unwrap();
    let owner_slot = slot.owners.iter().position(Option::is_none).unwrap();
    slot.owners[owner_slot] = Some(proc_index);

    handles[handle_slot] = Some(RingHandle { name: *name, user_base: base });

    Ok(base)
}

/// 处理 `ringbuf(name, CLOSE, _)`：解除调用者对命名环的绑定，必要时回收整个环。
fn ring_close(
    proc_index: usize,
    name: &[u8; RING_NAME_BUF],
    pagetable: &mut PageTable,
    handles: &mut [Option<RingHandle>; MAX_RINGS_PER_PROC],
) -> Result<(), ()> {
    let handle_slot = handles
        .iter()
        .position(|h| matches!(h, Some(h) if &h.name == name))
        .ok_or(())?;
    let base = handles[handle_slot].unwrap().user_base;

    let mut registry = RING_REGISTRY.lock();
    let reg_idx = registry
        .slots
        .iter()
        .position(|s| matches!(s, Some(slot) if &slot.name == name))
        .ok_or(())?;
    let owner_slot = registry.slots[reg_idx]
        .as_ref()
        .unwrap()
        .owners
        .iter()
        .position(|o| *o == Some(proc_index))
        .ok_or(())?;

    unbind(pagetable, base);
    handles[handle_slot] = None;
    registry.slots[reg_idx].as_mut().unwrap().owners[owner_slot] = None;

    let empty = registry.slots[reg_idx].as_ref().unwrap().owners.iter().all(Option::is_none);
    if empty {
        let slot = registry.slots[reg_idx].take().unwrap();
        unsafe {
            RawSinglePage::from_raw_and_drop(slot.book);
            RawRingPages::from_raw_and_drop(slot.payload);
        }
    }

    Ok(())
}

/// `ringbuf` 系统调用的唯一入口：校验名称后分派到 open/close。
///
/// # 参数
/// - `proc_index`：调用进程在进程表中的下标，用作所有者身份标识。
/// - `raw_name`：用户传入、可能未按 NUL 截断的名称缓冲区。
/// - `mode`：`RingOp::Open` 或 `RingOp::Close`。
/// - `pagetable` / `handles` / `cursor` / `proc_size`：调用者进程的私有状态。
///
/// # 返回值
/// - `Ok(addr)`：open 成功时为绑定区域起始地址，close 成功时恒为 0。
/// - `Err(())`：名称非法、表已满、内存耗尽、地址空间不足、
///   已经持有该环、该环所有者已满、或关闭了未持有的环。
pub fn ring_op(
    proc_index: usize,
    raw_name: &[u8],
    mode: RingOp,
    pagetable: &mut PageTable,
    handles: &mut [Option<RingHandle>; MAX_RINGS_PER_PROC],
    cursor: &mut usize,
    proc_size: usize,
) -> Result<usize, ()> {
    let name = validate_name(raw_name)?;
    match mode {
        RingOp::Open => ring_open(proc_index, &name, pagetable, handles, cursor, proc_size),
        RingOp::Close => ring_close(proc_index, &name, pagetable, handles).map(|()| 0),
    }
}

/// 进程退出（或 `exec` 替换地址空间之前）调用：无条件释放进程持有的所有环句柄。
///
/// 与 `ring_op(.., RingOp::Close, ..)` 不同的是，这里遍历整张句柄表而不要求
/// 调用者指明具体名称，且从不失败——调用者不再需要、也不可能提供更多信息。
pub fn ring_on_exit(
    proc_index: usize,
    pagetable: &mut PageTable,
    handles: &mut [Option<RingHandle>; MAX_RINGS_PER_PROC],
) {
    for i in 0..MAX_RINGS_PER_PROC {
        if let Some(handle) = handles[i] {
            let _ = ring_close(proc_index, &handle.name, pagetable, handles);
        }
    }
}

#[cfg(feature = "unit_test")]
pub mod tests {
    use super::*;
    use alloc::boxed::Box;
    use crate::consts::TRAPFRAME_ADDR;

    fn fresh_pagetable() -> Box<PageTable> {
        unsafe { Box::<PageTable>::try_new_zeroed().unwrap().assume_init() }
    }

    fn fresh_handles() -> ([Option<RingHandle>; MAX_RINGS_PER_PROC], usize) {
        (array![_ => None; MAX_RINGS_PER_PROC], TRAPFRAME_ADDR)
    }

    /// 名称长度校验：空名称、无 NUL 空间的 16 字节名称均应被拒绝，
    /// 恰好 15 字节（加 NUL 共 16 字节）应被接受。
    pub fn name_validation() {
        assert!(validate_name(b"").is_err());
        assert!(validate_name(b"0123456789ABCDEF").is_err());
        assert!(validate_name(b"ringbuf\0").is_ok());
        assert!(validate_name(b"0123456789ABCDE\0").is_ok());
    }

    /// 在负载区第一份映射的偏移 k 处写入的字节，应当在魔术映射
    /// （偏移 `RINGBUF_SIZE + k`）处原样可读，且不需要任何折返处理。
    pub fn double_map_visibility() {
        let mut pgt = fresh_pagetable();
        let (mut handles, mut cursor) = fresh_handles();
        let base = ring_op(1, b"double_map\0", RingOp::Open, &mut pgt, &mut handles, &mut cursor, 0)
            .expect("ring open should succeed on a fresh address space");

        let byte: u8 = 0x5a;
        let first = base + PGSIZE;
        let second = base + PGSIZE + RINGBUF_SIZE;
        pgt.copy_out(&byte as *const u8, first, 1).expect("copy_out into first mapping");

        let mut observed: u8 = 0;
        pgt.copy_in(second, &mut observed as *mut u8, 1).expect("copy_in from magic mapping");
        assert_eq!(observed, byte);

        ring_op(1, b"double_map\0", RingOp::Close, &mut pgt, &mut handles, &mut cursor, 0).unwrap();
    }

    /// 同一个名称最多同时有两个所有者：重复打开、以及第三个打开者都应失败，
    /// 而让出一个所有者之后应当能重新被第三方打开。
    pub fn ownership_limits() {
        let mut pgt_a = fresh_pagetable();
        let (mut handles_a, mut cursor_a) = fresh_handles();
        let mut pgt_b = fresh_pagetable();
        let (mut handles_b, mut cursor_b) = fresh_handles();
        let mut pgt_c = fresh_pagetable();
        let (mut handles_c, mut cursor_c) = fresh_handles();

        ring_op(10, b"double_own\0", RingOp::Open, &mut pgt_a, &mut handles_a, &mut cursor_a, 0).unwrap();
        assert!(ring_op(10, b"double_own\0", RingOp::Open, &mut pgt_a, &mut handles_a, &mut cursor_a, 0).is_err());

        ring_op(11, b"double_own\0", RingOp::Open, &mut pgt_b, &mut handles_b, &mut cursor_b, 0).unwrap();
        assert!(ring_op(12, b"double_own\0", RingOp::Open, &mut pgt_c, &mut handles_c, &mut cursor_c, 0).is_err());

        ring_op(10, b"double_own\0", RingOp::Close, &mut pgt_a, &mut handles_a, &mut cursor_a, 0).unwrap();
        ring_op(12, b"double_own\0", RingOp::Open, &mut pgt_c, &mut handles_c, &mut cursor_c, 0)
            .expect("a freed owner slot should admit a new owner");

        ring_op(11, b"double_own\0", RingOp::Close, &mut pgt_b, &mut handles_b, &mut cursor_b, 0).unwrap();
        ring_op(12, b"double_own\0", RingOp::Close, &mut pgt_c, &mut handles_c, &mut cursor_c, 0).unwrap();
    }

    /// 最后一个所有者关闭后，环的页面被归还页池；重新打开同名环时，
    /// book 与负载区的内容必须全为零。
    pub fn reopen_is_zeroed() {
        let mut pgt = fresh_pagetable();
        let (mut handles, mut cursor) = fresh_handles();

        let base = ring_op(20, b"wipe\0", RingOp::Open, &mut pgt, &mut handles, &mut cursor, 0).unwrap();
        let sentinel: u8 = 0x7f;
        pgt.copy_out(&sentinel as *const u8, base, 1).unwrap();
        ring_op(20, b"wipe\0", RingOp::Close, &mut pgt, &mut handles, &mut cursor, 0).unwrap();

        let base = ring_op(20, b"wipe\0", RingOp::Open, &mut pgt, &mut handles, &mut cursor, 0)
            .expect("reopening after the sole owner closed should succeed");
        let mut observed: u8 = 0xff;
        pgt.copy_in(base, &mut observed as *mut u8, 1).unwrap();
        assert_eq!(observed, 0);

        ring_op(20, b"wipe\0", RingOp::Close, &mut pgt, &mut handles, &mut cursor, 0).unwrap();
    }
}
