//! Properties of chunked delivery and source restarts against the sim.

use msecheck_core::drivers::{append_init, append_until};
use msecheck_core::{SegmentSource, SourceExt, TimeRange};
use proptest::prelude::*;

use crate::common::harness;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_chunk_size_does_not_change_buffered_ranges(
        chunk_size in 200usize..6000,
        seconds in 1usize..6,
    ) {
        let buffered = tokio_test::block_on(async {
            let h = harness("chunking").await;
            let buffer = h.add_buffer("video");
            let mut source = h.source("video").fixed_chunk_size(chunk_size);

            append_init(&h.ctx, buffer.as_ref(), &mut source, 0.0).await.unwrap();
            append_until(&h.ctx, buffer.as_ref(), &mut source, seconds as f64).await.unwrap();
            buffer.buffered()
        });

        prop_assert_eq!(buffered.len(), 1);
        prop_assert_eq!(buffered.get(0).map(|r| r.start), Some(0.0));
        prop_assert!(buffered.first_end().unwrap() >= seconds as f64);
        prop_assert!(buffered.first_end().unwrap() <= seconds as f64 + 1.0);
    }

    #[test]
    fn prop_restart_resumes_at_segment_boundary(seek_to in 0.0f64..9.5) {
        let (range, position, expected_offset) = tokio_test::block_on(async {
            let h = harness("restart").await;
            let buffer = h.add_buffer("video");
            let mut source = h.source("video");
            let descriptor = h.catalog.get("video").unwrap();

            append_init(&h.ctx, buffer.as_ref(), &mut source, 0.0).await.unwrap();
            append_until(&h.ctx, buffer.as_ref(), &mut source, 2.0).await.unwrap();

            source.seek(seek_to, Some(buffer.as_ref())).await.unwrap();
            let position = source.position();
            append_until(&h.ctx, buffer.as_ref(), &mut source, seek_to.floor() + 1.0)
                .await
                .unwrap();
            (
                buffer.buffered().get(0),
                position,
                descriptor.offset_for_time(seek_to),
            )
        });

        prop_assert_eq!(position, expected_offset);
        prop_assert_eq!(
            range,
            Some(TimeRange::new(seek_to.floor(), seek_to.floor() + 1.0))
        );
    }
}
