pub mod dto;
pub mod frame_loop;
pub mod ports;
pub mod services;
pub mod session_service;

#[cfg(test)]
pub mod testing;
