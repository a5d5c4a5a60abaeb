mod shm;
mod tcp;
mod udp;

pub use shm::ShmClient;
pub use tcp::TcpClient;
pub use udp::UdpClient;
