//! 内核编译期常量
//!
//! 本模块集中存放与硬件平台（QEMU virt，RISC-V Sv39）、内存布局、
//! 进程/文件表容量、以及进程间通信缓冲区大小相关的常量。
//! 多数数值沿用 xv6 的经典布局，便于与参考实现对照。

use core::convert::Into;

/// 编译期物理 / 虚拟地址常量的包装类型。
///
/// 仅用于在 `consts` 模块内以统一的形式声明地址类常量，
/// 通过 [`PhysAddr`](crate::mm::PhysAddr) / [`VirtAddr`](crate::mm::VirtAddr) 的
/// `From<ConstAddr>` 实现转换为具体的地址类型。
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct ConstAddr(usize);

impl From<ConstAddr> for usize {
    fn from(addr: ConstAddr) -> usize {
        addr.0
    }
}

/// 每颗处理器核心（hart）的数量上限
pub const NCPU: usize = 8;
/// 当前实际启动的核心数，供多核同步测试使用
pub const NSMP: usize = NCPU as usize;

/// 页大小：4KiB
pub const PGSIZE: usize = 4096;
/// 页内偏移位宽
pub const PGSHIFT: usize = 12;
/// 单级页表索引的位掩码（9 位）
pub const PGMASK: usize = 0x1FF;
/// 单级页表索引的位宽
pub const PGMASKLEN: usize = 9;

/// satp 寄存器中 Sv39 模式位
pub const SATP_SV39: usize = 8usize << 60;
/// 页表项中地址字段左移位数（10 位标志位）
pub const SV39FLAGLEN: usize = 10;

/// 支持的最大虚拟地址（Sv39 下为 1<<38，留一位防止符号扩展问题）
pub const MAXVA: ConstAddr = ConstAddr(1 << (9 + 9 + 9 + 12 - 1));

/// 内核代码起始物理地址
pub const KERNBASE: ConstAddr = ConstAddr(0x8000_0000);
/// 物理内存上限（QEMU virt 默认 128MiB）
pub const PHYSTOP: ConstAddr = ConstAddr(0x8000_0000 + 128 * 1024 * 1024);

/// 跳板页（trampoline）映射到每个地址空间的最高一页
pub const TRAMPOLINE: ConstAddr = ConstAddr((1usize << (9 + 9 + 9 + 12 - 1)) - PGSIZE);
/// [`TRAPFRAME`] 的裸 `usize` 形式，供需要在常量上下文中使用该地址的场景
/// （如 `const fn` 中的字段初值）直接引用，避免依赖非 `const` 的 `From<ConstAddr>`。
pub const TRAPFRAME_ADDR: usize = ((1usize << (9 + 9 + 9 + 12 - 1)) - PGSIZE) - PGSIZE;
/// 用户陷阱帧（trapframe），紧挨跳板页之下
pub const TRAPFRAME: ConstAddr = ConstAddr(TRAPFRAME_ADDR);
/// 用户代码段起始虚拟地址
pub const USERTEXT: ConstAddr = ConstAddr(0);

/// UART0 寄存器基址
pub const UART0: ConstAddr = ConstAddr(0x1000_0000);
/// UART0 寄存器映射区大小
pub const UART0_MAP_SIZE: usize = PGSIZE;
/// UART0 对应的 PLIC 中断号
pub const UART0_IRQ: usize = 10;

/// VIRTIO0 (磁盘) 寄存器基址
pub const VIRTIO0: ConstAddr = ConstAddr(0x1000_1000);
/// VIRTIO0 寄存器映射区大小
pub const VIRTIO0_MAP_SIZE: usize = PGSIZE;
/// VIRTIO0 对应的 PLIC 中断号
pub const VIRTIO0_IRQ: usize = 1;

/// CLINT（核心本地中断器）寄存器基址
pub const CLINT: ConstAddr = ConstAddr(0x0200_0000);
/// CLINT 寄存器映射区大小
pub const CLINT_MAP_SIZE: usize = 0x10000;
/// mtime 寄存器地址
pub const CLINT_MTIME: ConstAddr = ConstAddr(0x0200_0000 + 0xBFF8);
/// mtimecmp 寄存器基址（每核心偏移 8 字节）
pub const CLINT_MTIMECMP: ConstAddr = ConstAddr(0x0200_0000 + 0x4000);

/// PLIC（平台级中断控制器）寄存器基址
pub const PLIC: ConstAddr = ConstAddr(0x0c00_0000);
/// PLIC 寄存器映射区大小
pub const PLIC_MAP_SIZE: usize = 0x0400_0000;

/// 进程表容量
pub const NPROC: usize = 64;

/// exec 参数个数上限
pub const MAXARG: usize = 32;
/// 单个 exec 参数的最大长度
pub const MAXARGLEN: usize = 64;
/// 路径名最大长度
pub const MAXPATH: usize = 128;

/// 内核堆末端留给伙伴分配器管理的最小分配单元
pub const LEAF_SIZE: usize = 16;

/// 进程间通信相关容量
pub mod ipc {
    /// 管道环形缓冲区容量（字节）
    pub const PIPESIZE: usize = 512;
    /// [`PIPESIZE`] 的 `u32` 形式，供包裹计数使用
    pub const PIPESIZE_U32: u32 = PIPESIZE as u32;

    /// 共享内存环形缓冲区名称存放的字节数（含结尾 NUL）
    pub const RING_NAME_BUF: usize = 16;
    /// 环形缓冲区名称的最大长度（不含结尾 NUL）
    pub const RING_NAME_MAX: usize = RING_NAME_BUF - 1;
    /// 系统中允许同时存在的命名环形缓冲区数量
    pub const MAX_RINGS: usize = 16;
    /// 单个进程允许持有的环形缓冲区句柄数量
    pub const MAX_RINGS_PER_PROC: usize = 16;
    /// 单个环形缓冲区同时允许的所有者（绑定进程）数量上限
    pub const MAX_RING_OWNERS: usize = 2;
    /// 环形缓冲区负载区的页数（不含 book 页）
    pub const RINGBUF_PAGES: usize = 16;
    /// 环形缓冲区负载区容量（字节）
    pub const RINGBUF_SIZE: usize = RINGBUF_PAGES * super::PGSIZE;
    /// book 页页数，固定为 1
    pub const RING_BOOK_PAGES: usize = 1;
    /// 一次绑定在用户地址空间中占用的总页数：
    /// book 页 + 负载页 + 负载页的“魔术”重复映射
    pub const RING_REGION_PAGES: usize = RING_BOOK_PAGES + RINGBUF_PAGES * 2;
    /// 绑定区域总字节数
    pub const RING_REGION_SIZE: usize = RING_REGION_PAGES * super::PGSIZE;
}

/// 文件系统相关常量
pub mod fs {
    /// 磁盘块大小（字节）
    pub const BSIZE: usize = 1024;
    /// 超级块魔数
    pub const FSMAGIC: u32 = 0x10203040;
    /// 每个块内的位图位数
    pub const BPB: usize = BSIZE * 8;
    /// 缓冲区缓存容量
    pub const NBUF: usize = 30;

    /// 单次文件系统操作涉及的最大块数
    pub const MAXOPBLOCKS: usize = 10;
    /// 日志区大小（块数）
    pub const LOGSIZE: usize = MAXOPBLOCKS * 3;

    /// inode 缓存容量
    pub const NINODE: usize = 50;
    /// inode 直接块指针数
    pub const NDIRECT: usize = 12;
    /// 一级间接块可寻址的块数
    pub const NINDIRECT: usize = BSIZE / 4;
    /// 单文件最大字节数
    pub const MAX_FILE_SIZE: usize = (NDIRECT + NINDIRECT) * BSIZE;
    /// 目录项名称最大长度
    pub const MAX_DIR_SIZE: usize = 14;

    /// 根设备号
    pub const ROOTDEV: u32 = 1;
    /// 根目录 inode 编号
    pub const ROOTINUM: u32 = 1;
    /// 根目录路径，供启动时 `namei` 查找使用
    pub const ROOTIPATH: [u8; 2] = *b"/\0";

    /// 单进程可打开文件数上限
    pub const NFILE: usize = 100;

    pub const O_RDONLY: i32 = 0x000;
    pub const O_WRONLY: i32 = 0x001;
    pub const O_RDWR: i32 = 0x002;
    pub const O_CREATE: i32 = 0x200;
    pub const O_TRUNC: i32 = 0x400;
}

/// 设备驱动相关常量
pub mod driver {
    /// 设备号容量（对应 `FileInner::Device` 的设备表大小）
    pub const NDEV: usize = 10;
    /// 串口驱动内部缓冲区大小
    pub const UART_BUF: usize = 32;
}
