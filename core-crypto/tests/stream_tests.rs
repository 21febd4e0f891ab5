//! Streaming encryption through real async readers and writers.

use core_crypto::{CipherProvider, CryptoError, EncryptionKey};

fn provider() -> CipherProvider {
    let key = EncryptionKey::from_hex(&"ab".repeat(32)).unwrap();
    CipherProvider::new(&key).unwrap()
}

#[tokio::test]
async fn file_content_roundtrips_through_disk() {
    let provider = provider();
    let dir = std::env::temp_dir().join(format!("core-crypto-{}", std::process::id()));
    tokio::fs::create_dir_all(&dir).await.unwrap();

    let plain: Vec<u8> = (0..50_000u32).map(|i| (i * 7 % 256) as u8).collect();
    let source = dir.join("report.bin");
    tokio::fs::write(&source, &plain).await.unwrap();

    let file = tokio::fs::File::open(&source).await.unwrap();
    let sealed = provider.encrypt(file).await.unwrap();
    assert!(sealed.len() > plain.len());

    let sealed_path = dir.join("report.bin.enc");
    tokio::fs::write(&sealed_path, &sealed).await.unwrap();

    let restored_path = dir.join("report.restored");
    let mut sink = tokio::fs::File::create(&restored_path).await.unwrap();
    let sealed_file = tokio::fs::File::open(&sealed_path).await.unwrap();
    let written = provider.decrypt(sealed_file, &mut sink).await.unwrap();
    drop(sink);

    assert_eq!(written, plain.len() as u64);
    assert_eq!(tokio::fs::read(&restored_path).await.unwrap(), plain);

    tokio::fs::remove_dir_all(&dir).await.unwrap();
}

#[tokio::test]
async fn duplex_pipe_decrypts_incrementally() {
    let provider = provider();
    let plain = vec![0x11u8; 12_345];
    let sealed = provider.encrypt(plain.as_slice()).await.unwrap();

    let (mut writer, reader) = tokio::io::duplex(64);
    let feeder = tokio::spawn(async move {
        use tokio::io::AsyncWriteExt;
        writer.write_all(&sealed).await.unwrap();
    });

    let mut out = Vec::new();
    let written = provider.decrypt(reader, &mut out).await.unwrap();
    feeder.await.unwrap();

    assert_eq!(written, 12_345);
    assert_eq!(out, plain);
}

#[tokio::test]
async fn decrypting_with_another_key_fails() {
    let sealed = provider().encrypt(&b"quarterly numbers"[..]).await.unwrap();
    let other = CipherProvider::new(&EncryptionKey::generate()).unwrap();

    let mut out = Vec::new();
    let result = other.decrypt(sealed.as_ref(), &mut out).await;
    assert!(matches!(result, Err(CryptoError::Authentication)));
}
