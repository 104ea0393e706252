//! Property tests for the pipeline stages

use proptest::prelude::*;
use tensor_pipeline::{
    DataType, NormalizationParams, Pipeline, PipelineStage, QuantizationParams, ResizeMethod,
    TensorBuffer,
};

fn method() -> impl Strategy<Value = ResizeMethod> {
    prop_oneof![Just(ResizeMethod::NearestNeighbor), Just(ResizeMethod::Bilinear)]
}

proptest! {
    #[test]
    fn quantize_inverts_dequantize_within_one_step(
        values in prop::collection::vec(any::<u8>(), 1..64),
        scale in 0.001f32..1.0,
        zero_point in 0i32..=255,
    ) {
        let params = QuantizationParams::new(scale, zero_point);
        let input = TensorBuffer::from_vec(&[values.len()], values.clone()).unwrap();

        let real = PipelineStage::dequantize(params).unwrap().apply(input).unwrap();
        let back = PipelineStage::quantize(params, DataType::Uint8).unwrap().apply(real).unwrap();

        let back: Vec<u8> = back.as_array::<u8>().unwrap().iter().copied().collect();
        for (original, restored) in values.iter().zip(back.iter()) {
            prop_assert!((*original as i32 - *restored as i32).abs() <= 1);
        }
    }

    #[test]
    fn resize_always_produces_target_shape(
        src_h in 1usize..40,
        src_w in 1usize..40,
        channels in prop_oneof![Just(1usize), Just(3usize), Just(4usize)],
        height in 1usize..40,
        width in 1usize..40,
        method in method(),
    ) {
        let input = TensorBuffer::from_vec(
            &[src_h, src_w, channels],
            vec![7u8; src_h * src_w * channels],
        ).unwrap();
        let out = PipelineStage::resize(height, width, method).unwrap().apply(input).unwrap();
        prop_assert_eq!(out.shape(), &[height, width, channels][..]);
        prop_assert_eq!(out.dtype(), DataType::Uint8);
    }

    #[test]
    fn normalize_quantize_round_trip_preserves_order(
        a in any::<u8>(),
        b in any::<u8>(),
        mean in 0.0f32..255.0,
        stddev in 1.0f32..255.0,
        scale in 0.001f32..0.5,
        zero_point in 0i32..=255,
    ) {
        let (low, high) = if a <= b { (a, b) } else { (b, a) };
        let params = QuantizationParams::new(scale, zero_point);
        let pipeline = Pipeline::builder()
            .add(PipelineStage::normalize(NormalizationParams::scalar(mean, stddev).unwrap()))
            .add(PipelineStage::quantize(params, DataType::Uint8).unwrap())
            .add(PipelineStage::dequantize(params).unwrap())
            .build();

        let input = TensorBuffer::from_vec(&[1, 1, 2], vec![low, high]).unwrap();
        let out = pipeline.process(input).unwrap().to_f32_vec();
        prop_assert!(out[0] <= out[1]);
    }
}
