use std::env;

use simfs::{FileSystem, FsError};

pub fn main() -> Result<(), FsError> {
    env_logger::init();

    let mut builder = FileSystem::builder()
        .with_size(64)
        .with_block_size(4)
        .with_max_descriptors(15);
    if let Some(seed) = env::args().nth(1).and_then(|arg| arg.parse().ok()) {
        builder = builder.with_seed(seed);
    }
    let mut fs = builder.build()?;
    println!("mounted: {:?}", fs.super_block());

    let id = fs.create_file("notes")?;
    println!("created notes: {:?}", fs.file_stat(id)?);

    let fd = fs.open("notes")?;
    let written = fs.write(fd, 0, 3)?;
    println!("block 0: {:?} -> {:?}", written.before, written.after);
    println!("read back: {:?}", fs.read(fd, 0, 4)?);

    fs.mkdir("docs")?;
    fs.cd("docs")?;
    fs.link("notes-link", "/notes")?;
    fs.symlink("/notes", "shortcut")?;
    println!("{} holds {:?}", fs.cwd_path(), fs.list_directory());

    fs.truncate("shortcut", 10)?;
    println!("after truncate: {:?}", fs.file_stat(id)?);

    fs.cd("/")?;
    fs.close(fd);
    fs.unlink("notes")?;
    match fs.rmdir("docs") {
        Err(err) => println!("rmdir docs: {}", err),
        Ok(()) => println!("rmdir docs succeeded"),
    }
    fs.unlink("docs/shortcut")?;
    fs.unlink("docs/notes-link")?;
    fs.rmdir("docs")?;

    println!("{} of {} blocks free", fs.free_blocks(), fs.super_block().blocks_count);
    Ok(())
}
