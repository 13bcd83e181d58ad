//! End-to-end coverage of the testable properties: a handful of small,
//! hand-built SAM inputs run through the real header/filter/record machinery,
//! checked against the expected output.

use std::io::BufReader;

use samflow::{
    dedup::mark_duplicates,
    filters::{apply_filter, compose_header_filters, simple::filter_unmapped_reads, HeaderFilter},
    header::Header,
    io::LineReader,
    output::{MemorySink, SortOrder},
    record::Alignment,
};

fn read_all(sam: &str) -> (Header, Vec<Alignment>) {
    let mut reader = LineReader::new(BufReader::new(sam.as_bytes()));
    let header = Header::read(&mut reader).unwrap();
    let mut records = Vec::new();
    while let Some(line) = reader.getline().unwrap() {
        records.push(Alignment::parse(line).unwrap());
    }
    (header, records)
}

/// S1. Identity streaming: no filters, output text matches input byte for byte.
#[test]
fn s1_identity_streaming_round_trips_exactly() {
    let sam = "@HD\tVN:1.5\tSO:unsorted\n@SQ\tSN:chr1\tLN:100\nr1\t0\tchr1\t10\t60\t5M\t*\t0\t0\tACGTA\t!!!!!\n";
    let (header, records) = read_all(sam);

    let mut rendered = header.to_string();
    for aln in &records {
        rendered.push_str(&aln.to_string());
        rendered.push('\n');
    }
    assert_eq!(rendered, sam);
}

/// S2. `--filter-unmapped-reads` drops the unmapped read and keeps the mapped one.
#[test]
fn s2_filter_unmapped_reads_keeps_only_mapped() {
    let sam = "@HD\tVN:1.5\n@SQ\tSN:chr1\tLN:100\nr1\t0\tchr1\t10\t60\t5M\t*\t0\t0\tACGTA\t!!!!!\nr2\t4\t*\t0\t0\t*\t*\t0\t0\t*\t*\n";
    let (mut header, mut records) = read_all(sam);

    let filters: Vec<HeaderFilter> = vec![filter_unmapped_reads()];
    let filter = compose_header_filters(&mut header, &filters).unwrap().unwrap();
    apply_filter(&mut records, &filter);

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].qname.as_str(), "r1");
}

/// S3. Two fragments with the same (libid, refid, pos, strand) fingerprint:
/// the lower-scoring one is marked a duplicate, the winner is untouched.
#[test]
fn s3_mark_duplicates_keeps_higher_score_fragment() {
    let qual_120 = "I".repeat(120);
    let qual_90 = "I".repeat(90);
    let sam = format!(
        "@HD\tVN:1.5\n@SQ\tSN:chr1\tLN:1000\nr1\t0\tchr1\t100\t60\t120M\t*\t0\t0\t*\t{qual_120}\nr2\t0\tchr1\t100\t60\t90M\t*\t0\t0\t*\t{qual_90}\n",
    );
    let (mut header, mut records) = read_all(&sam);

    let filters: Vec<HeaderFilter> = vec![mark_duplicates(false)];
    let filter = compose_header_filters(&mut header, &filters).unwrap().unwrap();
    apply_filter(&mut records, &filter);

    let r1 = records.iter().find(|a| a.qname.as_str() == "r1").unwrap();
    let r2 = records.iter().find(|a| a.qname.as_str() == "r2").unwrap();
    assert!(!r1.is_duplicate());
    assert!(r2.is_duplicate());
}

/// S4. A tied score is broken deterministically by `QNAME`: the
/// lexicographically-larger name always loses, independent of arrival order.
#[test]
fn s4_mark_duplicates_deterministic_breaks_tie_by_qname() {
    let qual_100 = "I".repeat(100);
    let sam = format!(
        "@HD\tVN:1.5\n@SQ\tSN:chr1\tLN:1000\nbbb\t0\tchr1\t100\t60\t100M\t*\t0\t0\t*\t{qual_100}\naaa\t0\tchr1\t100\t60\t100M\t*\t0\t0\t*\t{qual_100}\n",
    );
    let (mut header, mut records) = read_all(&sam);

    let filters: Vec<HeaderFilter> = vec![mark_duplicates(true)];
    let filter = compose_header_filters(&mut header, &filters).unwrap().unwrap();
    apply_filter(&mut records, &filter);

    let aaa = records.iter().find(|a| a.qname.as_str() == "aaa").unwrap();
    let bbb = records.iter().find(|a| a.qname.as_str() == "bbb").unwrap();
    assert!(!aaa.is_duplicate());
    assert!(bbb.is_duplicate());
}

/// S5. Coordinate sort orders by resolved reference id, then position.
#[test]
fn s5_coordinate_sort_orders_by_refid_then_pos() {
    let sam = "@HD\tVN:1.5\n@SQ\tSN:chr1\tLN:1000\n@SQ\tSN:chr2\tLN:1000\nr1\t0\tchr2\t50\t60\t1M\t*\t0\t0\t*\t*\nr2\t0\tchr1\t200\t60\t1M\t*\t0\t0\t*\t*\nr3\t0\tchr1\t100\t60\t1M\t*\t0\t0\t*\t*\n";
    let (mut header, records) = read_all(sam);

    let filters: Vec<HeaderFilter> = vec![samflow::filters::simple::add_refid()];
    let filter = compose_header_filters(&mut header, &filters).unwrap().unwrap();
    let mut records = records;
    apply_filter(&mut records, &filter);

    let mut sink = MemorySink::new(header, records);
    sink.sort(SortOrder::Coordinate);

    let order: Vec<_> = sink.records.iter().map(|a| a.qname.as_str()).collect();
    assert_eq!(order, vec!["r3", "r2", "r1"]);
}

/// S6. Marking duplicates across three pair fingerprint groups and then
/// removing them leaves exactly one representative per group, sorted by
/// coordinate, with the duplicate bit clear on every surviving record.
#[test]
fn s6_mark_and_remove_round_trip_leaves_one_per_group_sorted() {
    let qual = "I".repeat(80);
    let mut sam = String::from("@HD\tVN:1.5\n@SQ\tSN:chr1\tLN:10000\n");
    // Three pair-duplicate groups, two copies of each pair (mate1/mate2 x2).
    for group in 0..3u32 {
        let pos1 = 100 + group * 1000;
        let pos2 = pos1 + 500;
        for copy in 0..2u32 {
            sam.push_str(&format!(
                "g{group}c{copy}\t99\tchr1\t{pos1}\t60\t80M\tchr1\t{pos2}\t{tlen}\t*\t{qual}\n",
                tlen = pos2 - pos1 + 80,
            ));
            sam.push_str(&format!(
                "g{group}c{copy}\t147\tchr1\t{pos2}\t60\t80M\tchr1\t{pos1}\t{tlen}\t*\t{qual}\n",
                tlen = -((pos2 - pos1 + 80) as i64),
            ));
        }
    }

    let (mut header, records) = read_all(&sam);
    let filters: Vec<HeaderFilter> = vec![
        samflow::filters::simple::add_refid(),
        mark_duplicates(true),
    ];
    let filter = compose_header_filters(&mut header, &filters).unwrap().unwrap();
    let mut records = records;
    apply_filter(&mut records, &filter);

    let remove_filters: Vec<HeaderFilter> =
        vec![samflow::filters::simple::filter_duplicate_reads()];
    let remove_filter = compose_header_filters(&mut header, &remove_filters)
        .unwrap()
        .unwrap();
    apply_filter(&mut records, &remove_filter);

    let mut sink = MemorySink::new(header, records);
    sink.sort(SortOrder::Coordinate);

    assert_eq!(sink.records.len(), 6, "one pair (two mates) per group survives");
    assert!(sink.records.iter().all(|a| !a.is_duplicate()));

    let positions: Vec<i32> = sink.records.iter().map(|a| a.pos).collect();
    let mut sorted_positions = positions.clone();
    sorted_positions.sort_unstable();
    assert_eq!(positions, sorted_positions, "coordinate order");
}

/// Unsupported CLI flag paths surface a named `ConfigError`, not a panic.
#[test]
fn config_error_is_returned_for_unknown_sorting_order() {
    assert!(SortOrder::parse("bogus").is_err());
}
