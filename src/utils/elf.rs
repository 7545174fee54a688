use byteorder::{ByteOrder, BE, LE};
use tokio::io::{AsyncBufRead, AsyncReadExt};

/// The slice of an ELF header needed to classify installed binaries for
/// stripping and runpath rewriting.
#[derive(Debug, Copy, Clone)]
pub struct ElfHeader {
    object_type: u16,
    pub machine: u16,
}

impl ElfHeader {
    const ELFCLASS32: u8 = 1;
    const ELFCLASS64: u8 = 2;

    const ELFDATA2LSB: u8 = 1;
    const ELFDATA2MSB: u8 = 2;

    const ET_EXEC: u16 = 2;
    const ET_DYN: u16 = 3;

    pub fn is_shared_object(&self) -> bool {
        self.object_type == ElfHeader::ET_DYN
    }

    pub fn is_executable(&self) -> bool {
        self.object_type == ElfHeader::ET_EXEC
    }

    /// Reads the e_ident, type and machine fields. Returns `None` for
    /// anything that is not a well-formed ELF file.
    pub async fn parse<R: AsyncBufRead + Unpin>(input: &mut R) -> anyhow::Result<Option<Self>> {
        let mut header = [0u8; 20];
        match input.read_exact(&mut header).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        }

        if &header[..4] != b"\x7FELF" {
            return Ok(None);
        }

        if header[4] != Self::ELFCLASS32 && header[4] != Self::ELFCLASS64 {
            return Ok(None);
        }

        let (object_type, machine) = match header[5] {
            Self::ELFDATA2LSB => Self::fields::<LE>(&header[16..]),
            Self::ELFDATA2MSB => Self::fields::<BE>(&header[16..]),
            _ => return Ok(None),
        };

        Ok(Some(ElfHeader {
            object_type,
            machine,
        }))
    }

    fn fields<B: ByteOrder>(past_ident: &[u8]) -> (u16, u16) {
        (
            B::read_u16(&past_ident[0..2]),
            B::read_u16(&past_ident[2..4]),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn header(class: u8, data: u8, object_type: u16, machine: u16) -> Vec<u8> {
        let mut buf = vec![0u8; 64];
        buf[..4].copy_from_slice(b"\x7FELF");
        buf[4] = class;
        buf[5] = data;
        buf[6] = 1;

        if data == ElfHeader::ELFDATA2LSB {
            buf[16..18].copy_from_slice(&object_type.to_le_bytes());
            buf[18..20].copy_from_slice(&machine.to_le_bytes());
        } else {
            buf[16..18].copy_from_slice(&object_type.to_be_bytes());
            buf[18..20].copy_from_slice(&machine.to_be_bytes());
        }

        buf
    }

    #[tokio::test]
    async fn classifies_little_endian_executable() {
        // EM_386 executable
        let buf = header(1, 1, 2, 3);
        let parsed = ElfHeader::parse(&mut Cursor::new(buf))
            .await
            .unwrap()
            .unwrap();

        assert!(parsed.is_executable());
        assert!(!parsed.is_shared_object());
        assert_eq!(parsed.machine, 3);
    }

    #[tokio::test]
    async fn classifies_big_endian_shared_object() {
        let buf = header(2, 2, 3, 20);
        let parsed = ElfHeader::parse(&mut Cursor::new(buf))
            .await
            .unwrap()
            .unwrap();

        assert!(parsed.is_shared_object());
        assert_eq!(parsed.machine, 20);
    }

    #[tokio::test]
    async fn rejects_bad_class_or_byte_order() {
        assert!(ElfHeader::parse(&mut Cursor::new(header(7, 1, 2, 3)))
            .await
            .unwrap()
            .is_none());

        assert!(ElfHeader::parse(&mut Cursor::new(header(1, 0, 2, 3)))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn rejects_non_elf_and_short_input() {
        assert!(ElfHeader::parse(&mut Cursor::new(b"#!/bin/sh\nexit 0\n\n\n\n".to_vec()))
            .await
            .unwrap()
            .is_none());

        assert!(ElfHeader::parse(&mut Cursor::new(b"\x7FELF".to_vec()))
            .await
            .unwrap()
            .is_none());
    }
}
